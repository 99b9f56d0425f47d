//! Bounded readiness polling.
//!
//! A [`Poller`] repeatedly runs a probe until it reports
//! [`Readiness::Ready`], reports [`Readiness::Failed`], errors, or the
//! deadline passes. Only "not there yet" is retried; probe errors end the
//! loop immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{LifecycleError, Stage};

/// Outcome of a single probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness<T> {
    /// The target condition holds.
    Ready(T),
    /// The resource has not reached the target condition yet.
    Pending,
    /// The resource reached a terminal error condition.
    Failed(String),
}

/// Interval and deadline for a polling loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    /// Creates a poller that probes every `interval` until `timeout` elapses.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Delay between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time allowed.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `probe` until it is ready. The probe always runs at least once.
    ///
    /// # Errors
    ///
    /// Returns the probe's own error unchanged,
    /// [`LifecycleError::ErrorState`] when the probe reports
    /// [`Readiness::Failed`], and [`LifecycleError::ActionTimeout`] when the
    /// deadline passes first.
    pub async fn until<T, F, Fut>(
        &self,
        stage: Stage,
        resource_id: &str,
        mut probe: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Readiness<T>, LifecycleError>>,
    {
        // A timeout beyond what `Instant` can represent never expires.
        let deadline = Instant::now().checked_add(self.timeout);
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match probe().await? {
                Readiness::Ready(value) => {
                    debug!(%stage, resource_id, attempts, "resource ready");
                    return Ok(value);
                }
                Readiness::Failed(status) => {
                    return Err(LifecycleError::ErrorState {
                        stage,
                        resource_id: resource_id.to_owned(),
                        status,
                    });
                }
                Readiness::Pending => {}
            }

            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|left| left.is_zero()) {
                return Err(LifecycleError::ActionTimeout {
                    stage,
                    resource_id: resource_id.to_owned(),
                });
            }
            sleep(remaining.map_or(self.interval, |left| self.interval.min(left))).await;
        }
    }
}
