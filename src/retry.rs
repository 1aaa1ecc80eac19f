//! Generic retry with exponential backoff

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy for one class of remote resource
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay, doubled each retry
    pub base: Duration,
    /// Upper bound on any single delay
    pub cap: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Extraction backend calls
    pub const fn extraction() -> Self {
        Self::new(3, Duration::from_secs(5), Duration::from_secs(30))
    }

    /// Embedding provider calls
    pub const fn embeddings() -> Self {
        Self::new(3, Duration::from_secs(15), Duration::from_secs(60))
    }

    /// Vision model calls
    pub const fn vision() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(20))
    }

    /// Storage calls (artifact and vector stores)
    pub const fn storage() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(30))
    }

    /// Delay before retry number `attempt` (0-based), jittered
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.cap);
        capped.mul_f64(jitter_factor())
    }
}

/// Multiplier in [0.5, 1.0) derived from the clock; avoids retry
/// alignment across concurrent documents without a PRNG dependency.
fn jitter_factor() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    0.5 + (f64::from(nanos % 1_000_000) / 2_000_000.0)
}

/// Run `op`, retrying transient failures per `policy`.
///
/// Non-transient errors return immediately; the last transient error is
/// returned once the attempt budget is exhausted.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", what, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    "{} attempt {} failed ({}), retrying in {:?}",
                    what,
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
