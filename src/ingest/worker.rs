//! Store writes with retry and exponential backoff.

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;

use crate::config::Config;
use crate::error::AppError;
use crate::store::{DeviceCommit, IrrigationStore};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.persist_retry_max,
            base_delay: Duration::from_millis(config.persist_retry_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, …
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Errors worth retrying: the database was unreachable or the statement
/// failed at runtime.
#[must_use]
pub fn is_transient(err: &DbErr) -> bool {
    matches!(
        err,
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) | DbErr::Exec(_) | DbErr::Query(_)
    )
}

/// Run `op` until it succeeds, fails permanently, or runs out of retries.
///
/// # Errors
///
/// Returns the last error seen.
pub async fn with_retry<T, F, Fut>(what: &str, policy: RetryPolicy, mut op: F) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.backoff(retries);
                tracing::warn!(
                    error = %e,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "{what} failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(error = %e, retries, "{what} failed");
                return Err(e);
            }
        }
    }
}

/// Persist one tracker step.
///
/// # Errors
///
/// Returns the store error once retries are exhausted.
pub async fn persist_commit(
    store: &dyn IrrigationStore,
    commit: &DeviceCommit,
    policy: RetryPolicy,
) -> Result<(), DbErr> {
    with_retry("Device commit", policy, || store.commit(commit)).await
}

/// Map a store failure to the HTTP error callers see.
#[must_use]
pub fn storage_error(err: DbErr) -> AppError {
    match err {
        DbErr::RecordNotFound(what) => AppError::NotFound(format!("{what} not found")),
        e if is_transient(&e) => {
            AppError::ServiceUnavailable("Storage unavailable, try again later".to_string())
        }
        e => AppError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 20,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(16), MAX_BACKOFF);
    }

    #[test]
    fn only_connection_and_runtime_errors_are_retried() {
        assert!(is_transient(&DbErr::Conn(RuntimeErr::Internal("down".into()))));
        assert!(!is_transient(&DbErr::RecordNotFound("device".into())));
        assert!(!is_transient(&DbErr::Custom("bad".into())));
    }

    #[test]
    fn storage_errors_map_to_http_errors() {
        assert!(matches!(
            storage_error(DbErr::RecordNotFound("device x".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            storage_error(DbErr::Conn(RuntimeErr::Internal("down".into()))),
            AppError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            storage_error(DbErr::Custom("bad".into())),
            AppError::Database(_)
        ));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), DbErr> = with_retry("Test", RetryPolicy::default(), || {
            calls += 1;
            async { Err(DbErr::Custom("constraint".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
