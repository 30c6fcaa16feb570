//! Error types for the Cloud Backup Schedule Operator

use thiserror::Error;

use crate::atlas::ApiError;
use crate::identity::ScheduleKey;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Remote schedule API error on a read
    #[error("Failed to read backup schedule {key}: {source}")]
    Api {
        key: ScheduleKey,
        #[source]
        source: ApiError,
    },

    /// Identity token could not be decoded into its fields
    #[error("Malformed identity '{token}': {reason}")]
    MalformedIdentity { token: String, reason: String },

    /// The cluster itself does not exist
    #[error("Cluster not found: {0}")]
    ClusterNotFound(ScheduleKey),

    /// The cluster exists but has no backup schedule
    #[error("Backup schedule not found: {0}")]
    ScheduleNotFound(ScheduleKey),

    /// A desired policy references an ID the remote does not know
    #[error("Policy '{policy_id}' not found in backup schedule {key}")]
    PolicyNotFound { key: ScheduleKey, policy_id: String },

    /// The remote rejected the schedule update
    #[error("Failed to update backup schedule {key}: {source}")]
    RemoteUpdate {
        key: ScheduleKey,
        #[source]
        source: ApiError,
    },

    /// The remote schedule is still present after a destroy
    #[error("Backup schedule {0} still exists")]
    StillExists(ScheduleKey),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Secret not found
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    /// Secret key not found
    #[error("Secret key '{key}' not found in secret '{secret}'")]
    SecretKeyNotFound { secret: String, key: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Wrap a failed read of the schedule identified by `key`
    pub fn api(key: &ScheduleKey, source: ApiError) -> Self {
        Error::Api {
            key: key.clone(),
            source,
        }
    }

    /// Create a malformed identity error
    pub fn malformed_identity(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedIdentity {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation later could succeed without
    /// the user changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(_) | Error::Finalizer(_) => true,
            Error::Api { source: e, .. } | Error::RemoteUpdate { source: e, .. } => e.is_retryable(),
            _ => false,
        }
    }
}
