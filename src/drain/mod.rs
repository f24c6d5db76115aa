//! Drain protocol run against an instance's agent before it is stopped.
//!
//! The first drain call decides the shape of the wait:
//!
//! - a positive answer is a fixed wait, slept in one go with no cancellation
//!   checkpoint;
//! - zero or a negative answer starts dynamic polling. Each iteration consults
//!   the task checkpoint, sleeps for the magnitude of the latest answer, and
//!   either finishes (nonnegative answer) or asks the agent for the drain
//!   status again.
//!
//! Dynamic polling has no iteration or time limit. A drain script that never
//! reports completion keeps the loop alive until the task is cancelled.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agent::{AgentClient, DrainSignal, DrainType};
use crate::checkpoint::TaskCheckpoint;
use crate::instance::{ApplySpec, Instance};
use crate::sleep::Sleeper;
use crate::stopper::StopError;

mod classify;

pub use classify::classify;

/// Path taken by a completed drain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrainMode {
    /// The first answer was positive: one uncancellable wait.
    Static,
    /// The first answer was zero or negative: checkpointed status polling.
    Dynamic,
}

/// Summary of a drain that ran to completion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DrainReport {
    /// Drain script class requested from the agent.
    pub drain_type: DrainType,
    /// Path taken after the first answer.
    pub mode: DrainMode,
    /// Total time spent waiting.
    pub waited: Duration,
    /// Number of status re-polls issued after the initial call.
    pub status_polls: u32,
}

impl DrainReport {
    const fn new(drain_type: DrainType, mode: DrainMode) -> Self {
        Self {
            drain_type,
            mode,
            waited: Duration::ZERO,
            status_polls: 0,
        }
    }
}

/// One drain run bound to a single instance's agent.
pub(crate) struct DrainSession<'a, A, C, S> {
    pub(crate) client: &'a A,
    pub(crate) checkpoint: &'a C,
    pub(crate) sleeper: &'a S,
    pub(crate) instance: &'a Instance,
}

impl<A, C, S> DrainSession<'_, A, C, S>
where
    A: AgentClient,
    C: TaskCheckpoint,
    S: Sleeper,
{
    /// Runs the drain protocol until the agent reports a terminal answer.
    ///
    /// `apply_spec` is the snapshot captured when the drain started; later
    /// changes to the instance are not visible to the drain script.
    pub(crate) async fn run(
        &self,
        drain_type: DrainType,
        apply_spec: &ApplySpec,
    ) -> Result<DrainReport, StopError<A::Error>> {
        let initial = self
            .client
            .drain(drain_type, Some(apply_spec))
            .await
            .map_err(StopError::Drain)?;
        debug!(instance = %self.instance, %drain_type, signal = initial.get(), "drain requested");

        if initial.is_static() {
            return Ok(self.wait_static(drain_type, initial).await);
        }
        self.wait_dynamic(drain_type, initial).await
    }

    async fn wait_static(&self, drain_type: DrainType, signal: DrainSignal) -> DrainReport {
        let wait = signal.wait();
        debug!(instance = %self.instance, wait_secs = wait.as_secs(), "waiting for static drain");
        self.sleeper.sleep(wait).await;

        let mut report = DrainReport::new(drain_type, DrainMode::Static);
        report.waited = wait;
        report
    }

    async fn wait_dynamic(
        &self,
        drain_type: DrainType,
        initial: DrainSignal,
    ) -> Result<DrainReport, StopError<A::Error>> {
        let mut report = DrainReport::new(drain_type, DrainMode::Dynamic);
        let mut current = initial;

        loop {
            // No iteration limit: a stuck script only ends on cancellation.
            if let Err(cancelled) = self.checkpoint.checkpoint() {
                warn!(instance = %self.instance, "drain cancelled: {cancelled}");
                return Err(StopError::Cancelled(cancelled));
            }

            let wait = current.wait();
            if !wait.is_zero() {
                info!(
                    instance = %self.instance,
                    wait_secs = wait.as_secs(),
                    "'{}' is draining: checking back in {}s",
                    self.instance,
                    wait.as_secs()
                );
                self.sleeper.sleep(wait).await;
                report.waited = report.waited.saturating_add(wait);
            }

            if current.is_terminal() {
                return Ok(report);
            }

            current = self
                .client
                .drain(DrainType::Status, None)
                .await
                .map_err(StopError::Drain)?;
            report.status_polls = report.status_polls.saturating_add(1);
        }
    }
}
