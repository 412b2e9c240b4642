//! Bounded exponential backoff.
//!
//! Used at startup to ride out a broker that is still coming up, and by the
//! dispatcher to redeliver messages whose handler hit a transient failure.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// The startup policy for broker connections: `retries` retries, each
    /// waiting twice as long as the one before, starting at `base_secs`.
    pub fn broker_connect(retries: u32, base_secs: u64) -> Self {
        Self {
            max_retries: retries,
            base_delay: Duration::from_secs(base_secs),
            max_delay: Duration::MAX,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// With a one second base this is `2^(attempt-1)` seconds; with the two
    /// second broker base it is `2^attempt` seconds. Capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exp);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget runs out. The last error is returned in the latter two
    /// cases.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "{} failed, retrying in {:?}",
                        what,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
