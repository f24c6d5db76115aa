//! Cooperative cancellation hook for long-running fleet tasks.

use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Raised by a checkpoint when the surrounding task has been cancelled.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub struct TaskCancelled {
    /// Identifier of the cancelled task, when known.
    pub task_id: Option<String>,
}

impl fmt::Display for TaskCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(id) => write!(f, "task {id} cancelled"),
            None => f.write_str("task cancelled"),
        }
    }
}

impl TaskCancelled {
    /// Cancellation of an anonymous task.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { task_id: None }
    }

    /// Cancellation of the identified task.
    #[must_use]
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
        }
    }
}

/// Consulted periodically by long-running operations.
///
/// Implementations only observe a cancellation signal; they never mutate
/// shared state on behalf of the caller.
pub trait TaskCheckpoint {
    /// Returns normally, or [`TaskCancelled`] if the task must abort.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCancelled`] once cancellation has been requested.
    fn checkpoint(&self) -> Result<(), TaskCancelled>;
}

impl<T: TaskCheckpoint + ?Sized> TaskCheckpoint for &T {
    fn checkpoint(&self) -> Result<(), TaskCancelled> {
        (**self).checkpoint()
    }
}

/// Checkpoint for operations that run outside any cancellable task.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NeverCancelled;

impl TaskCheckpoint for NeverCancelled {
    fn checkpoint(&self) -> Result<(), TaskCancelled> {
        Ok(())
    }
}

impl TaskCheckpoint for CancellationToken {
    fn checkpoint(&self) -> Result<(), TaskCancelled> {
        if self.is_cancelled() {
            return Err(TaskCancelled::anonymous());
        }
        Ok(())
    }
}

/// Cancellation token tagged with the task it belongs to.
#[derive(Clone, Debug)]
pub struct TaskToken {
    task_id: String,
    token: CancellationToken,
}

impl TaskToken {
    /// Wraps `token` for the task identified by `task_id`.
    #[must_use]
    pub fn new(task_id: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            token,
        }
    }

    /// Identifier of the owning task.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl TaskCheckpoint for TaskToken {
    fn checkpoint(&self) -> Result<(), TaskCancelled> {
        if self.token.is_cancelled() {
            return Err(TaskCancelled::for_task(self.task_id.clone()));
        }
        Ok(())
    }
}
