//! Retry with exponential backoff and jitter for flaky outbound calls.

use rand::{thread_rng, Rng};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}
impl Default for RetryConfig { fn default() -> Self { Self { max_retries: 5, base_delay: Duration::from_millis(50), max_delay: Duration::from_millis(1500), jitter: 0.25 } } }

impl RetryConfig {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(31) as i32));
        let mut delay = std::cmp::min(exp, self.max_delay);
        if self.jitter > 0.0 {
            let jitter_ms = (delay.as_millis() as f64 * self.jitter) as i64;
            let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
            delay = Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64);
        }
        delay
    }
}

/// Retries every error up to `cfg.max_retries` times.
pub async fn retry_async<F, Fut, T, E>(cfg: &RetryConfig, op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_if(cfg, op, |_| true).await
}

/// Like [`retry_async`], but gives up immediately on errors `retryable` rejects.
pub async fn retry_async_if<F, Fut, T, E, P>(cfg: &RetryConfig, mut op: F, retryable: P) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= cfg.max_retries || !retryable(&e) => return Err(e),
            Err(e) => {
                let delay = cfg.delay_for(attempt);
                warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
