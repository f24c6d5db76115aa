//! Errors surfaced by the stop sequence.

use thiserror::Error;

use crate::checkpoint::TaskCancelled;

/// Errors raised while draining and stopping an instance.
///
/// Agent failures are carried unmodified as the error source; nothing in the
/// stop sequence retries them.
#[derive(Debug, Error)]
pub enum StopError<AgentError>
where
    AgentError: std::error::Error + 'static,
{
    /// Raised when the initial drain call or a status re-poll fails.
    #[error("drain request failed: {0}")]
    Drain(#[source] AgentError),
    /// Raised when the stop call fails after draining completed.
    #[error("stop request failed: {0}")]
    Stop(#[source] AgentError),
    /// Raised when the task was cancelled during dynamic draining.
    #[error(transparent)]
    Cancelled(#[from] TaskCancelled),
}

impl<AgentError> StopError<AgentError>
where
    AgentError: std::error::Error + 'static,
{
    /// Whether the sequence was aborted by task cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the agent's communication error, if that caused the failure.
    #[must_use]
    pub const fn agent_error(&self) -> Option<&AgentError> {
        match self {
            Self::Drain(err) | Self::Stop(err) => Some(err),
            Self::Cancelled(_) => None,
        }
    }
}
