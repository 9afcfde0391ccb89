//! Bounded retries with exponential backoff around fallible async calls
//!
//! An [`Operation`] describes one retryable unit: a name for the logs, the
//! callable, the [`RetryPolicy`] and a classifier deciding which errors are
//! worth another attempt. Running it consumes the descriptor, so a single
//! descriptor can never have overlapping retries; distinct operations are
//! independent of each other.

use crate::error::{ConsentLexError, Result};
use std::future::Future;
use std::time::Duration;

/// Decides whether an error may be retried.
pub type Classifier = fn(&ConsentLexError) -> bool;

/// Backoff parameters for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Extra factor applied after a rate-limit failure
    pub rate_limit_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            rate_limit_multiplier: 3.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = self.max_delay.max(base_delay);
        self
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    ///
    /// `base_delay * multiplier^(attempt-1)`, stretched for rate limits and
    /// never below a server supplied `Retry-After`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &ConsentLexError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let mut secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if let ConsentLexError::RateLimit { retry_after, .. } = error.root() {
            secs *= self.rate_limit_multiplier;
            if let Some(hint) = retry_after {
                secs = secs.max(hint.as_secs_f64());
            }
        }

        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Upper bound on the total time spent sleeping between attempts.
    pub fn worst_case_wait(&self) -> Duration {
        self.max_delay * self.max_attempts.saturating_sub(1)
    }
}

/// A named, retryable unit of work.
pub struct Operation<F> {
    name: String,
    policy: RetryPolicy,
    classify: Classifier,
    call: F,
}

impl<F, Fut, T> Operation<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub fn new(name: impl Into<String>, policy: RetryPolicy, call: F) -> Self {
        Self {
            name: name.into(),
            policy,
            classify: ConsentLexError::is_retryable,
            call,
        }
    }

    /// Override which errors count as retryable for this call site.
    pub fn classify_with(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callable until it succeeds, fails fatally or runs out of attempts.
    pub async fn run(mut self) -> Result<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match (self.call)().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = %self.name,
                            attempt,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let kind = error.kind();
            if !(self.classify)(&error) {
                tracing::warn!(
                    operation = %self.name,
                    attempt,
                    max_attempts,
                    delay_ms = 0u64,
                    error_kind = %kind,
                    error = %error,
                    "operation failed with non-retryable error"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    operation = %self.name,
                    attempt,
                    max_attempts,
                    delay_ms = 0u64,
                    error_kind = %kind,
                    error = %error,
                    "operation failed, attempts exhausted"
                );
                return Err(ConsentLexError::RetriesExhausted {
                    operation: self.name,
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(attempt, &error);
            tracing::warn!(
                operation = %self.name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error_kind = %kind,
                error = %error,
                "operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Run `call` under `policy` with the default classifier.
pub async fn with_retry<F, Fut, T>(name: &str, policy: &RetryPolicy, call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Operation::new(name, policy.clone(), call).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            rate_limit_multiplier: 3.0,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let p = policy(5);
        let err = ConsentLexError::TransientNetwork("reset".into());
        assert_eq!(p.delay_for(1, &err), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, &err), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, &err), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut p = policy(20);
        p.max_delay = Duration::from_millis(250);
        let err = ConsentLexError::Timeout("slow".into());
        assert_eq!(p.delay_for(10, &err), Duration::from_millis(250));
        assert_eq!(p.worst_case_wait(), Duration::from_millis(250 * 19));
    }

    #[test]
    fn test_rate_limit_waits_longer() {
        let p = policy(3);
        let err = ConsentLexError::rate_limited("429");
        assert_eq!(p.delay_for(1, &err), Duration::from_millis(300));

        let hinted = ConsentLexError::RateLimit {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(p.delay_for(1, &hinted), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_uses_all_attempts() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<()> = with_retry("test.flaky", &policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConsentLexError::TransientNetwork("down".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ConsentLexError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "test.flaky");
                assert_eq!(attempts, 3);
                assert_eq!(source.kind(), ErrorKind::TransientNetwork);
            }
            other => panic!("unexpected error: {other}"),
        }
        // 100ms + 200ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry("test.fatal", &policy(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConsentLexError::Configuration("bad key".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ConsentLexError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_retry("test.recover", &policy(4), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(ConsentLexError::Timeout("slow".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = Operation::new("test.custom", policy(4), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConsentLexError::TransientNetwork("down".into()))
        })
        .classify_with(|_| false)
        .run()
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ConsentLexError::TransientNetwork(_))));
    }

    proptest! {
        #[test]
        fn prop_permanent_retryable_failure_runs_exactly_n_times(n in 1u32..7) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let calls = AtomicU32::new(0);

            let result: Result<()> = runtime.block_on(with_retry("prop.fail", &policy(n), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConsentLexError::rate_limited("busy"))
            }));

            prop_assert_eq!(calls.load(Ordering::SeqCst), n);
            let attempts_reported = matches!(
                result,
                Err(ConsentLexError::RetriesExhausted { attempts, .. }) if attempts == n
            );
            prop_assert!(attempts_reported);
        }

        #[test]
        fn prop_fatal_kinds_run_once(n in 1u32..7, which in 0usize..3) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let calls = AtomicU32::new(0);

            let _ = runtime.block_on(with_retry("prop.fatal", &policy(n), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(match which {
                    0 => ConsentLexError::Configuration("key".into()),
                    1 => ConsentLexError::Validation("input".into()),
                    _ => ConsentLexError::Extraction("illegible".into()),
                })
            }));

            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
