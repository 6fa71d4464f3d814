use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Registry or snapshot store unreachable. Retryable, isolated per category.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Send failed. Retryable; no state was mutated.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A malformed listing; the item is skipped, never fatal to the cycle.
    #[error("inconsistent snapshot entry {title:?}: {reason}")]
    InconsistentSnapshot { title: String, reason: String },

    /// Send succeeded but recording it failed. Not retried to avoid a second send.
    #[error("reconciliation needed for subscription {subscription_id} (user {user_id}): {reason}")]
    Reconciliation {
        subscription_id: String,
        user_id: String,
        reason: String,
    },

    #[error("{what} timed out after {limit:?}")]
    Timeout { what: &'static str, limit: Duration },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_)
                | EngineError::TransportFailure(_)
                | EngineError::Timeout { .. }
        )
    }

    /// True when the user has (probably) received the message despite the error.
    pub fn was_delivered(&self) -> bool {
        matches!(self, EngineError::Reconciliation { .. })
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::TransportFailure(err.to_string())
    }
}

/// Runs a store or transport call under a caller-supplied deadline.
pub async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(EngineError::Timeout { what, limit }),
    }
}
