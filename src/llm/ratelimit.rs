//! Backoff and request-rate policy for the LLM classifier (spec §4.4).
//!
//! Generalizes the teacher's header-driven `RateLimitManager` into a
//! transport-agnostic policy: exponential backoff on transient failure,
//! plus a simple per-minute request ceiling, since none of the three
//! concrete backends this spec targets is required to expose rate-limit
//! response headers the way the Anthropic API does.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);
pub const MAX_BACKOFF_ATTEMPTS: u32 = 5;

/// Computes the delay before attempt `attempt` (1-indexed), doubling from
/// `BACKOFF_INITIAL` and capping at `BACKOFF_CAP`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let millis = BACKOFF_INITIAL.as_millis().saturating_mul(1u128 << exp);
    Duration::from_millis(millis.min(BACKOFF_CAP.as_millis()) as u64)
}

/// A simple token-bucket style limiter: tracks request timestamps within
/// the trailing 60-second window and makes the caller wait if the
/// configured ceiling would be exceeded.
pub struct RateLimiter {
    requests_per_minute: u32,
    window_start: Mutex<(Instant, u32)>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            window_start: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Blocks until a slot in the current per-minute window is available,
    /// then reserves it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.window_start.lock().await;
                let (start, count) = *state;
                if start.elapsed() >= Duration::from_secs(60) {
                    *state = (Instant::now(), 1);
                    None
                } else if count < self.requests_per_minute {
                    state.1 += 1;
                    None
                } else {
                    Some(Duration::from_secs(60) - start.elapsed())
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}
