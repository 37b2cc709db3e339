//! Retry support for transient resolver failures.
//!
//! The dns stage retries a failed query against the pool before dropping
//! the name. Only errors that look transient are retried; authoritative
//! negatives (NXDOMAIN) are terminal immediately.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::errors::EnumError;

/// Configuration for the dns-stage retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts beyond the first before the name is dropped.
    pub max_attempts: u32,
    /// Pause between attempts; jittered by up to 10%.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            delay: Duration::from_millis(100),
        }
    }
}

/// True when the resolver error is worth another attempt.
pub fn is_transient(err: &EnumError) -> bool {
    match err {
        EnumError::QueryTimeout { .. } => true,
        EnumError::Resolver { reason, .. } => {
            let r = reason.to_lowercase();
            !r.contains("no records found") && !r.contains("nxdomain")
        }
        _ => false,
    }
}

/// Run `op` until it succeeds, returns a terminal error, or the attempt
/// budget is exhausted.
pub async fn with_retries<F, Fut, T>(cfg: &RetryConfig, op: F) -> Result<T, EnumError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, EnumError>>,
{
    let mut last = None;
    for attempt in 0..=cfg.max_attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !is_transient(&e) || attempt == cfg.max_attempts {
                    return Err(e);
                }
                last = Some(e);
                sleep(jittered(cfg.delay)).await;
            }
        }
    }
    Err(last.unwrap_or_else(|| EnumError::internal("retry loop exhausted")))
}

fn jittered(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let spread = (delay.as_millis() as f64 * 0.1) as u64;
    delay + Duration::from_millis(rng.random_range(0..=spread.max(1)))
}
