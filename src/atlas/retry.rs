//! Retry with exponential backoff and jitter at the client boundary.
//!
//! The remote control plane is eventually consistent: a read issued right
//! after an update may still miss the change or briefly report the resource
//! as absent. Retrying happens here, around the client, never inside the
//! reconciliation core.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{error, warn};

use super::{ApiError, Cluster, Schedule, ScheduleApi, ScheduleUpdate};

/// Configuration for calls that may fail transiently
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying while `should_retry` accepts the
/// error and attempts remain.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_attempts` is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts.max(1) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// [`ScheduleApi`] decorator that retries transient failures
pub struct RetryingScheduleApi<A> {
    inner: A,
    config: RetryConfig,
    retry_not_found: bool,
}

impl<A: ScheduleApi> RetryingScheduleApi<A> {
    pub fn new(inner: A, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            retry_not_found: false,
        }
    }

    /// Also retry reads answered with "not found", to ride out
    /// read-after-write lag on freshly created clusters.
    pub fn retry_not_found(mut self, enabled: bool) -> Self {
        self.retry_not_found = enabled;
        self
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn should_retry_read(&self, e: &ApiError) -> bool {
        e.is_retryable() || (self.retry_not_found && e.is_not_found())
    }
}

#[async_trait]
impl<A: ScheduleApi> ScheduleApi for RetryingScheduleApi<A> {
    async fn get_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<Schedule, ApiError> {
        retry_with_backoff(
            &self.config,
            "get_schedule",
            |e| self.should_retry_read(e),
            || self.inner.get_schedule(project_id, cluster_name),
        )
        .await
    }

    async fn update_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
        update: &ScheduleUpdate,
    ) -> Result<Schedule, ApiError> {
        retry_with_backoff(
            &self.config,
            "update_schedule",
            ApiError::is_retryable,
            || self.inner.update_schedule(project_id, cluster_name, update),
        )
        .await
    }

    async fn get_cluster(&self, project_id: &str, cluster_name: &str) -> Result<Cluster, ApiError> {
        retry_with_backoff(
            &self.config,
            "get_cluster",
            |e| self.should_retry_read(e),
            || self.inner.get_cluster(project_id, cluster_name),
        )
        .await
    }
}
