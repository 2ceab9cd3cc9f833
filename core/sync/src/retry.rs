//! Retry with exponential backoff for transient remote failures.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use chunksync_common::{Error, Result};

/// Backoff settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by +/- 25%.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let delay = if self.jitter {
            capped * (0.75 + rand::random::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs remote operations with a per-attempt deadline and backoff.
///
/// Only errors for which [`Error::is_transient`] holds are retried; an
/// attempt exceeding its deadline counts as `Error::Timeout`.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
    attempt_timeout: Option<Duration>,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_timeout: None,
        }
    }

    /// Bound every attempt by `deadline`.
    pub fn with_attempt_timeout(mut self, deadline: Duration) -> Self {
        self.attempt_timeout = Some(deadline);
        self
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// `what` names the operation in log output.
    pub async fn execute<F, Fut, T>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;

        loop {
            match self.attempt(what, operation()).await {
                Ok(value) => {
                    if retry > 0 {
                        debug!("{} succeeded after {} retries", what, retry);
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if retry >= self.config.max_retries => {
                    if self.config.max_retries > 0 {
                        warn!("{} failed after {} retries: {}", what, retry, err);
                    }
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.config.delay_for_retry(retry);
                    retry += 1;
                    warn!(
                        "{} failed (attempt {}): {}. Retrying in {:?}",
                        what, retry, err, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt<Fut, T>(&self, what: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match self.attempt_timeout {
            Some(deadline) => timeout(deadline, fut).await.map_err(|_| {
                Error::Timeout(format!("{} exceeded {:?}", what, deadline))
            })?,
            None => fut.await,
        }
    }
}
