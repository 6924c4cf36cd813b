//! Rate-limited retry wrapper for service calls.
//!
//! Two concerns share this type: a minimum spacing between outbound calls
//! across all worker tasks, and capped exponential backoff with jitter on
//! failure. Spacing is enforced by reserving a send slot under a lock and
//! sleeping outside it, so concurrent tasks queue up behind each other
//! instead of stampeding the service.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;

use crate::error::{PipelineError, ServiceError};

const BACKOFF_CAP: Duration = Duration::from_secs(8);
const BACKOFF_JITTER: Duration = Duration::from_millis(250);
const SPACING_JITTER: Duration = Duration::from_millis(50);

pub struct Retrier {
    max_attempts: u32,
    min_spacing: Duration,
    next_slot: Mutex<Instant>,
}

impl Retrier {
    pub fn new(max_attempts: u32, min_spacing: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_spacing,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Reserve the next send slot and sleep until it arrives.
    async fn pace(&self) {
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=SPACING_JITTER);
        let wait = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let at = (*next).max(now);
            *next = at + self.min_spacing + jitter;
            at.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn backoff(attempt: u32) -> Duration {
        let base = Duration::from_secs(1 << (attempt - 1).min(3));
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=BACKOFF_JITTER);
        base.min(BACKOFF_CAP) + jitter
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Every error from the service is treated as transient until the last
    /// attempt, which escalates to [`PipelineError::ExhaustedRetries`].
    pub async fn call<T, F, Fut>(&self, label: &str, op: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        for attempt in 1..=self.max_attempts {
            self.pace().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt == self.max_attempts => {
                    return Err(PipelineError::ExhaustedRetries {
                        attempts: self.max_attempts,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = Self::backoff(attempt);
                    warn!(
                        %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "service call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("retry loop always returns")
    }
}
