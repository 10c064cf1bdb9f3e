//! Retry policy for backend calls.
//!
//! A failed call is repeated only when the failure says nothing about the
//! request itself: the network dropped, the call timed out, or the server was
//! overloaded. Anything the backend actually answered is final. The engine's
//! default configuration does not retry at all.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::EngineError;

/// How many times, and how patiently, a backend call is repeated.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Up to this fraction of the delay is added at random.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Short delays, for interactive calls and tests.
    pub fn quick() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(200),
            jitter: 0.0,
        }
    }

    /// Delay before retry number `retry` (0-based): doubled each time,
    /// capped, plus jitter.
    fn delay(&self, retry: u32) -> Duration {
        let doubled = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff);
        if self.jitter <= 0.0 {
            return doubled;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        doubled + doubled.mul_f64(extra)
    }
}

/// Whether a failed call may succeed if sent again unchanged.
pub fn is_retryable(error: &EngineError) -> bool {
    match error {
        EngineError::Transport(_) | EngineError::Timeout => true,
        EngineError::Http { status } => *status == 429 || (500..600).contains(status),
        _ => false,
    }
}

/// Run `call` until it succeeds, fails for good, or the retries run out.
pub async fn retry_rpc_call<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    call: F,
) -> Result<T, EngineError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut retry = 0;
    loop {
        let error = match call().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(operation, retries = retry, "Backend call recovered");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_retryable(&error) || retry >= config.max_retries {
            warn!(
                operation,
                attempts = retry + 1,
                kind = error.kind(),
                error = %error,
                "Backend call failed"
            );
            return Err(error);
        }

        let delay = config.delay(retry);
        warn!(
            operation,
            attempt = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Backend call failed, retrying"
        );
        sleep(delay).await;
        retry += 1;
    }
}
