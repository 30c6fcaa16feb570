//! HTTP client for the remote backup schedule API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, Cluster, Schedule, ScheduleApi, ScheduleUpdate};

/// Default control-plane endpoint
pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com";

const API_PREFIX: &str = "api/atlas/v1.0";
const ACCEPT: &str = "application/json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ScheduleApi`] over HTTPS
#[derive(Clone)]
pub struct AtlasClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AtlasClient {
    /// Create a client authenticating with a bearer token
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn cluster_url(&self, project_id: &str, cluster_name: &str) -> String {
        format!(
            "{}/{}/groups/{}/clusters/{}",
            self.base_url, API_PREFIX, project_id, cluster_name
        )
    }

    fn schedule_url(&self, project_id: &str, cluster_name: &str) -> String {
        format!("{}/backup/schedule", self.cluster_url(project_id, cluster_name))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        decode_response(response, resource).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: Response,
    resource: &str,
) -> Result<T, ApiError> {
    let status = response.status();
    debug!(resource = %resource, status = status.as_u16(), "Backup schedule API response");

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(resource.to_string()));
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl ScheduleApi for AtlasClient {
    async fn get_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<Schedule, ApiError> {
        let url = self.schedule_url(project_id, cluster_name);
        let resource = format!("backup schedule {}/{}", project_id, cluster_name);
        self.send(self.http.get(url), &resource).await
    }

    async fn update_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
        update: &ScheduleUpdate,
    ) -> Result<Schedule, ApiError> {
        let url = self.schedule_url(project_id, cluster_name);
        let resource = format!("backup schedule {}/{}", project_id, cluster_name);
        self.send(self.http.patch(url).json(update), &resource).await
    }

    async fn get_cluster(&self, project_id: &str, cluster_name: &str) -> Result<Cluster, ApiError> {
        let url = self.cluster_url(project_id, cluster_name);
        let resource = format!("cluster {}/{}", project_id, cluster_name);
        self.send(self.http.get(url), &resource).await
    }
}
