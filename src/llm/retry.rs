//! Deadline budgeting and the single-retry policy for external calls.
//!
//! Every external call site (router, query rewrite, embedding, synthesis,
//! index search) gets at most one retry with a short jittered backoff,
//! and no call — first attempt, backoff, or retry — may run past the
//! request's overall deadline.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Absolute budget for one request, subdivided across stages.
///
/// Cheap to copy; created once by the orchestrator and threaded to every
/// call site so no stage can exceed the request's overall deadline.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline fires. Zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Timeout for one external call: the per-call ceiling, clipped to
    /// whatever budget remains.
    pub fn call_budget(&self, call_timeout: Duration) -> Duration {
        call_timeout.min(self.remaining())
    }
}

/// Run an external call with a bounded timeout and at most one retry.
///
/// The factory is invoked per attempt. Timeouts count as failures; the
/// retry is skipped if the backoff would cross the deadline.
pub async fn call_with_retry<T, F, Fut>(
    provider: &str,
    deadline: Deadline,
    call_timeout: Duration,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if deadline.is_expired() {
        return Err(ProviderError::DeadlineExhausted {
            provider: provider.to_string(),
        });
    }

    let budget = deadline.call_budget(call_timeout);
    let first = match tokio::time::timeout(budget, attempt()).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e,
        Err(_) => ProviderError::Timeout {
            provider: provider.to_string(),
            timeout: budget,
        },
    };

    // Jitter the backoff so concurrent requests don't retry in lockstep.
    let jittered = backoff + Duration::from_millis(rand::thread_rng().gen_range(0..50));
    if deadline.remaining() <= jittered {
        warn!(provider, error = %first, "No budget left for retry");
        return Err(first);
    }

    debug!(provider, error = %first, backoff_ms = jittered.as_millis() as u64, "Retrying after failure");
    tokio::time::sleep(jittered).await;

    let budget = deadline.call_budget(call_timeout);
    if budget.is_zero() {
        return Err(ProviderError::DeadlineExhausted {
            provider: provider.to_string(),
        });
    }
    match tokio::time::timeout(budget, attempt()).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            timeout: budget,
        }),
    }
}
