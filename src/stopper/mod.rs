//! Drains and stops a single instance.
//!
//! [`Stopper`] is invoked once per instance by the surrounding fleet update,
//! after that update has decided the instance must go down. It checks whether
//! the instance can be drained at all, runs the drain protocol unless told to
//! skip it, and then asks the agent to stop the instance's jobs. The stop
//! call is never issued before draining has reached a terminal answer.

use tracing::{debug, info};

use crate::agent::{AgentClient, AgentResolver};
use crate::checkpoint::TaskCheckpoint;
use crate::drain::{DrainReport, DrainSession, classify};
use crate::instance::{Instance, InstancePlan, TargetState, VmReference};
use crate::sleep::{Sleeper, TokioSleeper};

mod error;

pub use error::StopError;

/// Error type produced by stopping through resolver `R`.
pub type ResolverError<R> = StopError<<<R as AgentResolver>::Client as AgentClient>::Error>;

/// Reason an instance was left untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ineligible {
    /// No VM has been provisioned for the instance.
    NoVm,
    /// The instance is a transient compilation worker.
    CompilationWorker,
}

/// What a stop call did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopOutcome {
    /// Nothing was done and no agent was contacted.
    Ineligible(Ineligible),
    /// The agent was asked to stop the instance.
    Stopped {
        /// Drain that preceded the stop, or `None` when draining was skipped.
        drain: Option<DrainReport>,
    },
}

/// Orchestrates drain-then-stop for individual instances.
#[derive(Debug)]
pub struct Stopper<R, C, S = TokioSleeper> {
    resolver: R,
    checkpoint: C,
    sleeper: S,
}

impl<R, C> Stopper<R, C> {
    /// Creates a stopper that waits on the tokio timer.
    #[must_use]
    pub const fn new(resolver: R, checkpoint: C) -> Self {
        Self {
            resolver,
            checkpoint,
            sleeper: TokioSleeper,
        }
    }
}

impl<R, C, S> Stopper<R, C, S> {
    /// Replaces the sleeper used for drain waits.
    ///
    /// This is primarily used by tests to observe waits without elapsing
    /// them.
    #[must_use]
    pub fn with_sleeper<T>(self, sleeper: T) -> Stopper<R, C, T> {
        Stopper {
            resolver: self.resolver,
            checkpoint: self.checkpoint,
            sleeper,
        }
    }
}

impl<R, C, S> Stopper<R, C, S>
where
    R: AgentResolver,
    C: TaskCheckpoint,
    S: Sleeper,
{
    /// Drains (unless `skip_drain` is set) and stops the instance in `plan`.
    ///
    /// Instances without a VM and compilation workers are left untouched.
    /// The agent handle is bound once for this call and released when it
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::Drain`] or [`StopError::Stop`] when the agent
    /// cannot be reached, and [`StopError::Cancelled`] when the task is
    /// cancelled during dynamic draining. The instance is left as it stood;
    /// nothing is rolled back.
    pub async fn stop(
        &self,
        plan: &InstancePlan,
        target_state: TargetState,
        skip_drain: bool,
    ) -> Result<StopOutcome, ResolverError<R>> {
        let instance = plan.instance();
        let vm = match eligibility(instance) {
            Ok(vm) => vm,
            Err(reason) => {
                debug!(%instance, ?reason, "instance not eligible for stop");
                return Ok(StopOutcome::Ineligible(reason));
            }
        };

        let client = self.resolver.bind_to(vm);

        let drain = if skip_drain {
            info!(%instance, "Skipping drain for '{instance}'");
            None
        } else {
            Some(self.drain(&client, plan, target_state).await?)
        };

        debug!(%instance, "stopping instance");
        client.stop().await.map_err(StopError::Stop)?;
        Ok(StopOutcome::Stopped { drain })
    }

    async fn drain(
        &self,
        client: &R::Client,
        plan: &InstancePlan,
        target_state: TargetState,
    ) -> Result<DrainReport, ResolverError<R>> {
        let instance = plan.instance();
        let drain_type = classify(target_state, plan);
        debug!(%instance, %target_state, %drain_type, "classified drain");

        // Snapshot at drain start.
        let apply_spec = instance.apply_spec().clone();

        DrainSession {
            client,
            checkpoint: &self.checkpoint,
            sleeper: &self.sleeper,
            instance,
        }
        .run(drain_type, &apply_spec)
        .await
    }
}

fn eligibility(instance: &Instance) -> Result<&VmReference, Ineligible> {
    if instance.is_compilation_worker() {
        return Err(Ineligible::CompilationWorker);
    }
    instance.vm().ok_or(Ineligible::NoVm)
}
