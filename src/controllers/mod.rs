//! Kubernetes controller for CloudBackupSchedule resources
//!
//! This module contains the controller implementation that watches for CRD changes
//! and triggers reconciliation.

mod schedule_controller;

pub use schedule_controller::run as run_schedule_controller;

use kube::Client;

use crate::adapters::get_api_token;
use crate::atlas::{AtlasClient, RetryConfig, RetryingScheduleApi, DEFAULT_BASE_URL};
use crate::crd::CloudBackupScheduleSpec;
use crate::error::{Error, Result};

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Remote API base URL used when a resource does not set one
    pub default_base_url: String,
    /// Retry behaviour for remote API calls
    pub retry: RetryConfig,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client) -> Self {
        Self {
            client,
            default_base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.default_base_url = base_url.into();
        self
    }

    /// Build an authenticated remote API handle for a schedule resource
    pub async fn schedule_api(
        &self,
        spec: &CloudBackupScheduleSpec,
        namespace: &str,
    ) -> Result<RetryingScheduleApi<AtlasClient>> {
        let token = get_api_token(&self.client, namespace, &spec.credentials_secret).await?;
        let base_url = spec
            .api_base_url
            .as_deref()
            .unwrap_or(&self.default_base_url);
        let client = AtlasClient::new(base_url, token).map_err(|e| {
            Error::config(format!("Failed to build backup schedule API client: {}", e))
        })?;
        Ok(RetryingScheduleApi::new(client, self.retry.clone()).retry_not_found(true))
    }
}
