//! Exponential backoff with jitter for outbound fetches.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    pub fn none() -> Self {
        Self::with_max_retries(0)
    }
}

/// Run `operation` until it succeeds or `retryable` says stop.
pub(crate) async fn retry_with_backoff<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;
    loop {
        attempt += 1;
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) => {
                if attempt > policy.max_retries {
                    error!(operation = %operation_name, attempt, error = %e, "retries exhausted");
                    return Err(e);
                }
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let wait = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(operation = %operation_name, attempt, error = %e, delay_ms = wait.as_millis() as u64, "retrying");
                metrics::counter!("config_fetch_retries_total").increment(1);
                tokio::time::sleep(wait).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * policy.backoff_multiplier).min(policy.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let res: Result<u32, &str> = retry_with_backoff(
            &fast(3),
            "op",
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 { Err("busy") } else { Ok(7) }
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(res, Ok(7));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_retries() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let res: Result<u32, &str> = retry_with_backoff(
            &fast(2),
            "op",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(res, Err("down"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let res: Result<u32, &str> = retry_with_backoff(
            &fast(5),
            "op",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            },
            |e| *e != "fatal",
        )
        .await;
        assert_eq!(res, Err("fatal"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
