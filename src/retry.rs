use crate::config::RetryConfig;
use std::{fmt::Display, future::Future};
use tokio::time::{sleep, Duration};

/// Errors that may succeed when the same call is attempted again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the policy's
/// retries are used up. Delays double with +/-10% jitter.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, E>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry_delay = policy.initial_delay;
    let mut retry_count = 0;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry_count < policy.max_retries => {
                retry_count += 1;
                tracing::warn!(
                    "{} failed, retrying (attempt {}/{}): {}",
                    operation,
                    retry_count,
                    policy.max_retries,
                    e
                );
                let jitter = rand::random::<f32>() * 0.2 + 0.9;
                sleep(retry_delay.mul_f32(jitter)).await;
                retry_delay = (retry_delay * 2).min(policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}
