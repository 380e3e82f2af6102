//! Call-rate bounding and retry utilities for upstream requests.
//!
//! [`SlidingWindowLimiter`] is shared by every request in the process and
//! caps calls to `max_calls` per rolling `window`. [`retry_with_backoff`]
//! retries transient failures of a single call with jittered exponential
//! backoff; each retry goes back through the limiter because the operation
//! closure itself calls [`SlidingWindowLimiter::admit`].

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ScraperError;

/// Sliding-window admission control.
///
/// `admit()` never rejects a call; it suspends until one more call fits in the
/// window and then records it. Dropping the future while it waits records
/// nothing.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_calls: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(window: Duration, max_calls: usize) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            window,
            max_calls,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Waits until a call is allowed, then records it.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }

                calls.front().map_or(Duration::ZERO, |&oldest| {
                    self.window.saturating_sub(now.duration_since(oldest))
                })
            };

            tracing::debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                max_calls = self.max_calls,
                "rate limiter at capacity, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Attempt | Sleep before next attempt     |
/// |---------|-------------------------------|
/// | 1       | 1 000 ms × 2⁰ ± 25 % jitter   |
/// | 2       | 1 000 ms × 2¹ ± 25 % jitter   |
/// | 3       | 1 000 ms × 2² ± 25 % jitter   |
///
/// Delay is capped at 30 s, except that a 429 always waits at least its
/// `Retry-After`. Non-retriable errors (see
/// [`ScraperError::is_retriable`]) are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                // Never come back sooner than the upstream asked.
                let delay_ms = match &err {
                    ScraperError::RateLimited { retry_after_secs } => {
                        jittered.max(retry_after_secs.saturating_mul(1_000))
                    }
                    _ => jittered,
                };
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient upstream error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> ScraperError {
        ScraperError::RateLimited {
            retry_after_secs: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_capacity_without_waiting() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_admission_waits_for_oldest_to_leave_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();
        limiter.admit().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        limiter.admit().await;
        limiter.admit().await;

        limiter.admit().await;
        // The oldest call (t=0) leaves the window at t=60.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admissions_never_share_a_slot() {
        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(10), 2));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.admit().await;
                start.elapsed()
            }));
        }

        let mut elapsed = Vec::new();
        for h in handles {
            elapsed.push(h.await.unwrap());
        }
        elapsed.sort();
        assert_eq!(
            elapsed,
            vec![
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(20),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_admission_records_nothing() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();
        limiter.admit().await;

        let timed_out = tokio::time::timeout(Duration::from_secs(5), limiter.admit()).await;
        assert!(timed_out.is_err());

        limiter.admit().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ScraperError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limited_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, ScraperError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_waits_for_retry_after() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let start = Instant::now();
        let result = retry_with_backoff(1, 1_000, || {
            let cc = Arc::clone(&cc);
            async move {
                if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ScraperError::RateLimited {
                        retry_after_secs: 45,
                    })
                } else {
                    Ok::<u32, ScraperError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert!(start.elapsed() >= Duration::from_secs(45));
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScraperError>(ScraperError::Timeout {
                    url: "https://upstream.test/".to_owned(),
                    timeout_secs: 10,
                })
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ScraperError::Timeout { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScraperError>(ScraperError::NotFound {
                    url: "https://upstream.test/ghost/".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScraperError::NotFound { .. })));
    }
}
