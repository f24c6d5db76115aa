//! Wait primitive used by the drain protocol.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Suspends the current drain until a duration has elapsed.
///
/// These waits are the only points where a stop sequence yields.
pub trait Sleeper {
    /// Waits for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        (**self).sleep(duration)
    }
}

/// Sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}
