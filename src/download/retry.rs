//! Retry with exponential backoff for acquisition steps.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`.
    pub base_delay: Duration,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Add random jitter of [0, base_delay/2).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.download.retries,
            base_delay: Duration::from_millis(config.download.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.download.retry_max_delay_ms),
            jitter: true,
        }
    }

    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        // Jitter never pushes the delay past `max_delay`.
        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }

    /// Delay before retrying after `err` on the given attempt.
    fn delay_after(&self, err: &Error, attempt: u32) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match err {
            Error::RateLimited(secs) => backoff
                .max(Duration::from_secs(*secs))
                .min(self.max_delay),
            _ => backoff,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget of its error is spent.
    ///
    /// `retries` is incremented for every retry performed. Cancellation
    /// during a backoff sleep yields [`Error::Cancelled`].
    pub async fn run<F, Fut, T>(
        &self,
        step: &str,
        token: &CancellationToken,
        retries: &mut u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= err.retry_budget(self.max_retries) {
                return Err(err);
            }

            let delay = self.delay_after(&err, attempt);
            tracing::warn!(
                step,
                attempt = attempt + 1,
                max = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient error"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            *retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_under_cap() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter: true,
        };
        for attempt in 0..6 {
            assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(250));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let mut retries = 0;
        let result = fast(3)
            .run("fetch", &CancellationToken::new(), &mut retries, |attempt| async move {
                if attempt < 2 {
                    Err(Error::Timeout("chunk".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut retries = 0;
        let mut calls = 0;
        let result: Result<()> = fast(3)
            .run("license", &CancellationToken::new(), &mut retries, |_| {
                calls += 1;
                async { Err(Error::NotEntitled("B000000001".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::NotEntitled(_))));
        assert_eq!(calls, 1);
        assert_eq!(retries, 0);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let mut retries = 0;
        let result: Result<()> = fast(2)
            .run("fetch", &CancellationToken::new(), &mut retries, |_| async {
                Err(Error::Connection("reset".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_invalid_license_retried_once() {
        let mut retries = 0;
        let result: Result<()> = fast(5)
            .run("license", &CancellationToken::new(), &mut retries, |_| async {
                Err(Error::InvalidLicense {
                    item: "B000000001".into(),
                    reason: "expired".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            jitter: false,
        };

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let mut retries = 0;
        let result: Result<()> = policy
            .run("fetch", &token, &mut retries, |_| async {
                Err(Error::Timeout("chunk".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
