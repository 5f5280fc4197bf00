//! Bounded polling for eventually-consistent remote state.
//!
//! The management store replicates writes between nodes lazily, so a read
//! issued right after a write may still observe the old value.
//! [`ConvergencePoller::wait`] re-evaluates a read-only predicate until it
//! holds or the timeout elapses. A predicate that errors counts as
//! "not yet"; only the timeout ends the wait.
//!
//! Timing uses `tokio::time`, so a paused test runtime converges or times
//! out without real sleeping.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PollSettings;
use crate::error::BackendError;

/// Waits for remote reads to reflect a write.
#[derive(Debug, Clone, Copy)]
pub struct ConvergencePoller {
    defaults: PollSettings,
}

impl ConvergencePoller {
    /// Poller using `defaults` for [`ConvergencePoller::wait_default`].
    pub fn new(defaults: PollSettings) -> Self {
        Self { defaults }
    }

    /// Settings used by [`ConvergencePoller::wait_default`].
    pub fn defaults(&self) -> PollSettings {
        self.defaults
    }

    /// Polls `predicate` every `interval` until it returns `Ok(true)` or
    /// `timeout` has elapsed. Returns whether it converged.
    pub async fn wait<F, Fut>(
        &self,
        what: &str,
        mut predicate: F,
        timeout: Duration,
        interval: Duration,
    ) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, BackendError>>,
    {
        // A timeout too large to represent means the wait has no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match predicate().await {
                Ok(true) => {
                    debug!(what, attempts, "converged");
                    return true;
                }
                Ok(false) => {}
                Err(e) => debug!(what, attempts, error = %e, "transient read failure while polling"),
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(what, attempts, timeout_secs = timeout.as_secs(), "did not converge");
                        return false;
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// [`ConvergencePoller::wait`] with explicit settings.
    pub async fn wait_with<F, Fut>(&self, what: &str, predicate: F, settings: PollSettings) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, BackendError>>,
    {
        self.wait(what, predicate, settings.timeout(), settings.interval())
            .await
    }

    /// [`ConvergencePoller::wait`] with the configured defaults.
    pub async fn wait_default<F, Fut>(&self, what: &str, predicate: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, BackendError>>,
    {
        self.wait_with(what, predicate, self.defaults).await
    }
}

impl Default for ConvergencePoller {
    fn default() -> Self {
        Self::new(PollSettings::default())
    }
}
