
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Enforces a minimum wall-clock duration for an operation.
///
/// The floor applies whatever the outcome; an operation that already took
/// longer than the floor is never delayed further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    minimum: Duration,
}

impl Pacer {
    #[inline]
    pub fn new(minimum: Duration) -> Self {
        Self { minimum }
    }

    #[inline]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    #[inline]
    pub fn minimum(&self) -> Duration {
        self.minimum
    }

    /// Run `operation`, then sleep for whatever remains of the floor
    #[inline]
    pub async fn pace<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        let started = Instant::now();
        let output = operation.await;

        let remaining = self.minimum.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            debug!("Pacing: holding for another {:?}", remaining);
            sleep(remaining).await;
        }

        output
    }
}

impl Default for Pacer {
    #[inline]
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
