//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::agent::{AgentClient, AgentFuture, AgentResolver, DrainSignal, DrainType};
use crate::checkpoint::{TaskCancelled, TaskCheckpoint};
use crate::instance::{ApplySpec, VmReference};
use crate::sleep::{SleepFuture, Sleeper};

fn lock<T>(mutex: &Mutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observable step taken while stopping an instance.
#[derive(Clone, Debug, PartialEq)]
pub enum StopEvent {
    /// An agent handle was bound for the VM.
    Bind(VmReference),
    /// A drain call was issued.
    Drain {
        /// Requested drain type.
        drain_type: DrainType,
        /// Apply spec supplied with the call.
        apply_spec: Option<ApplySpec>,
    },
    /// The task checkpoint was evaluated.
    Checkpoint,
    /// A wait was performed.
    Sleep(Duration),
    /// The stop call was issued.
    Stop,
}

/// Ordered record of [`StopEvent`]s shared between the scripted doubles.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<StopEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: StopEvent) {
        lock(&self.events).push(event);
    }

    /// Returns a snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<StopEvent> {
        lock(&self.events).clone()
    }

    /// Number of recorded events matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StopEvent) -> bool) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| predicate(*event))
            .count()
    }

    /// Number of drain calls of the given type.
    #[must_use]
    pub fn drain_calls(&self, drain_type: DrainType) -> usize {
        self.count(|event| {
            matches!(event, StopEvent::Drain { drain_type: seen, .. } if *seen == drain_type)
        })
    }

    /// Number of drain calls of any type.
    #[must_use]
    pub fn all_drain_calls(&self) -> usize {
        self.count(|event| matches!(event, StopEvent::Drain { .. }))
    }

    /// Number of checkpoint evaluations.
    #[must_use]
    pub fn checkpoints(&self) -> usize {
        self.count(|event| matches!(event, StopEvent::Checkpoint))
    }

    /// Number of stop calls.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.count(|event| matches!(event, StopEvent::Stop))
    }

    /// Durations of every recorded wait, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                StopEvent::Sleep(duration) => Some(*duration),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that reached the agent (binding excluded).
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        self.count(|event| matches!(event, StopEvent::Drain { .. } | StopEvent::Stop))
    }
}

/// Errors raised by [`ScriptedAgent`] to model communication failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedAgentError {
    /// Raised when a drain call was scripted to fail.
    #[error("agent unreachable during drain")]
    DrainUnreachable,
    /// Raised when the stop call was scripted to fail.
    #[error("agent unreachable during stop")]
    StopUnreachable,
    /// Raised when a drain call arrives with no scripted answer left.
    #[error("no scripted drain response available")]
    Exhausted,
}

#[derive(Debug, Default)]
struct AgentState {
    responses: VecDeque<Result<DrainSignal, ScriptedAgentError>>,
    fail_stop: bool,
}

/// Agent double answering drain calls from a FIFO script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedAgent {
    log: EventLog,
    state: Arc<Mutex<AgentState>>,
}

impl ScriptedAgent {
    /// Creates an agent recording into `log`.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            state: Arc::default(),
        }
    }

    /// Queues the answer for the next drain call.
    pub fn push_signal(&self, value: i64) {
        lock(&self.state)
            .responses
            .push_back(Ok(DrainSignal::new(value)));
    }

    /// Queues answers for successive drain calls.
    pub fn push_signals(&self, values: &[i64]) {
        for value in values {
            self.push_signal(*value);
        }
    }

    /// Makes the next unanswered drain call fail.
    pub fn push_drain_failure(&self) {
        lock(&self.state)
            .responses
            .push_back(Err(ScriptedAgentError::DrainUnreachable));
    }

    /// Makes every stop call fail.
    pub fn fail_stop(&self) {
        lock(&self.state).fail_stop = true;
    }

    /// Number of scripted answers not yet consumed.
    #[must_use]
    pub fn pending_signals(&self) -> usize {
        lock(&self.state).responses.len()
    }
}

impl AgentClient for ScriptedAgent {
    type Error = ScriptedAgentError;

    fn drain<'a>(
        &'a self,
        drain_type: DrainType,
        apply_spec: Option<&'a ApplySpec>,
    ) -> AgentFuture<'a, DrainSignal, Self::Error> {
        Box::pin(async move {
            self.log.push(StopEvent::Drain {
                drain_type,
                apply_spec: apply_spec.cloned(),
            });
            lock(&self.state)
                .responses
                .pop_front()
                .unwrap_or(Err(ScriptedAgentError::Exhausted))
        })
    }

    fn stop(&self) -> AgentFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.log.push(StopEvent::Stop);
            if lock(&self.state).fail_stop {
                return Err(ScriptedAgentError::StopUnreachable);
            }
            Ok(())
        })
    }
}

/// Resolver handing out clones of one [`ScriptedAgent`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedResolver {
    agent: ScriptedAgent,
}

impl ScriptedResolver {
    /// Creates a resolver for `agent`.
    #[must_use]
    pub const fn new(agent: ScriptedAgent) -> Self {
        Self { agent }
    }
}

impl AgentResolver for ScriptedResolver {
    type Client = ScriptedAgent;

    fn bind_to(&self, vm: &VmReference) -> Self::Client {
        self.agent.log.push(StopEvent::Bind(vm.clone()));
        self.agent.clone()
    }
}

/// Checkpoint double that cancels on a chosen evaluation.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCheckpoint {
    log: EventLog,
    cancel_on: Option<usize>,
    evaluations: Arc<Mutex<usize>>,
}

impl ScriptedCheckpoint {
    /// Creates a checkpoint that never cancels.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            cancel_on: None,
            evaluations: Arc::default(),
        }
    }

    /// Cancels on the `evaluation`-th call (1-based) and every call after it.
    #[must_use]
    pub const fn cancel_on(mut self, evaluation: usize) -> Self {
        self.cancel_on = Some(evaluation);
        self
    }
}

impl TaskCheckpoint for ScriptedCheckpoint {
    fn checkpoint(&self) -> Result<(), TaskCancelled> {
        self.log.push(StopEvent::Checkpoint);
        let mut evaluations = lock(&self.evaluations);
        *evaluations += 1;
        match self.cancel_on {
            Some(threshold) if *evaluations >= threshold => {
                Err(TaskCancelled::for_task("scripted"))
            }
            _ => Ok(()),
        }
    }
}

/// Sleeper that records waits and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    log: EventLog,
}

impl RecordingSleeper {
    /// Creates a sleeper recording into `log`.
    #[must_use]
    pub const fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        self.log.push(StopEvent::Sleep(duration));
        Box::pin(std::future::ready(()))
    }
}

/// One log wired through every scripted collaborator.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCollaborators {
    /// Shared event log.
    pub log: EventLog,
    /// Agent double.
    pub agent: ScriptedAgent,
    /// Checkpoint double.
    pub checkpoint: ScriptedCheckpoint,
    /// Sleeper double.
    pub sleeper: RecordingSleeper,
}

impl ScriptedCollaborators {
    /// Creates doubles sharing one fresh log.
    #[must_use]
    pub fn new() -> Self {
        let log = EventLog::new();
        Self {
            agent: ScriptedAgent::new(log.clone()),
            checkpoint: ScriptedCheckpoint::new(log.clone()),
            sleeper: RecordingSleeper::new(log.clone()),
            log,
        }
    }

    /// Resolver bound to the shared agent.
    #[must_use]
    pub fn resolver(&self) -> ScriptedResolver {
        ScriptedResolver::new(self.agent.clone())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
