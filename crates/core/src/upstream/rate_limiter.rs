//! Minimum-interval request gate with randomized jitter.
//!
//! One limiter is shared by every request a client instance issues. The gate
//! is held across the jitter sleep, so callers are serialized in arrival
//! order rather than merely spaced out.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::UpstreamError;
use crate::metrics::{THROTTLE_WAITS, THROTTLE_WAIT_SECONDS};

/// Proof that the caller passed the gate.
#[derive(Debug, Clone, Copy)]
pub struct RatePermit {
    /// When the permit was granted.
    pub granted_at: Instant,
    /// Time spent sleeping before the grant.
    pub waited: Duration,
}

/// Serializing rate limiter.
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A zero `min_interval` disables pacing entirely.
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            last_grant: Mutex::new(None),
        }
    }

    /// A limiter that grants immediately.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the gate.
    ///
    /// If the previous grant happened no more than `min_interval` ago, sleeps
    /// for a random duration in `[min_interval, min_interval + jitter]` while
    /// holding the gate, then records the new grant time.
    ///
    /// A cancelled wait returns [`UpstreamError::Cancelled`] and leaves the
    /// last grant time untouched.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RatePermit, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }

        if self.min_interval.is_zero() {
            return Ok(RatePermit {
                granted_at: Instant::now(),
                waited: Duration::ZERO,
            });
        }

        let mut last = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            guard = self.last_grant.lock() => guard,
        };

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            if previous.elapsed() <= self.min_interval {
                let delay = self.pick_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Rate limiter: waiting");
                THROTTLE_WAITS.with_label_values(&["rate_limiter"]).inc();

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    _ = sleep(delay) => {}
                }

                THROTTLE_WAIT_SECONDS
                    .with_label_values(&["rate_limiter"])
                    .observe(delay.as_secs_f64());
                waited = delay;
            }
        }

        let now = Instant::now();
        *last = Some(now);

        Ok(RatePermit {
            granted_at: now,
            waited,
        })
    }

    fn pick_delay(&self) -> Duration {
        let min = self.min_interval.as_millis() as u64;
        let max = min + self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
