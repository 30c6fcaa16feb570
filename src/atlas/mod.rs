//! Remote backup schedule API boundary
//!
//! The reconciliation core only talks to the remote control plane through
//! [`ScheduleApi`]. The HTTP implementation and the retry decorator live
//! here so the core stays deterministic under test.

mod client;
mod model;
mod retry;

pub use client::*;
pub use model::*;
pub use retry::*;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Errors returned by a [`ScheduleApi`] implementation
#[derive(Error, Debug)]
pub enum ApiError {
    /// The requested resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The API answered with a non-success status
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the error is transient and the call may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::NotFound(_) | ApiError::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Remote backup schedule API client
///
/// This trait abstracts the control-plane calls for testability. Every
/// reconciliation receives an explicit handle; there is no global client.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// Read the current backup schedule of a cluster
    async fn get_schedule(&self, project_id: &str, cluster_name: &str)
        -> Result<Schedule, ApiError>;

    /// Replace the backup schedule of a cluster in one call
    async fn update_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
        update: &ScheduleUpdate,
    ) -> Result<Schedule, ApiError>;

    /// Read a cluster
    async fn get_cluster(&self, project_id: &str, cluster_name: &str) -> Result<Cluster, ApiError>;
}
