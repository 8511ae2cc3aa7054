//! Staging client over the Nexus staging REST surface.
//!
//! Endpoints:
//! - `GET  {base}/staging/profiles/`            profile discovery
//! - `POST {base}/staging/profiles/{id}/start`  create a staging repository
//! - `GET  {base}/staging/repository/{id}`      repository status
//! - `POST {base}/staging/bulk/{close|promote|drop}`
//!
//! Transport failures map to `RemoteUnavailable`, HTTP 409 to
//! `StagingConflict`, and everything else unexpected to `Protocol`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shipway_core::{
    ReleaseError, RepositoryId, Result, StagingClient, StagingState, StagingStatus,
};

/// Connection settings for a Nexus staging repository manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusConfig {
    /// Base URL of the staging REST surface, without a trailing slash.
    pub base_url: String,

    /// Staging profile to create repositories under. When unset, the
    /// profile is discovered from the remote and must be unambiguous.
    pub staging_profile: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Description attached to created repositories and bulk requests.
    pub description: String,
}

impl NexusConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            staging_profile: None,
            username: None,
            password: None,
            description: "shipway release".to_string(),
        }
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.staging_profile = Some(profile.to_string());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}

// Wire types, matching the staging REST bodies.

#[derive(Debug, Deserialize)]
struct ProfileListResponse {
    data: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    data: StartRequestData<'a>,
}

#[derive(Debug, Serialize)]
struct StartRequestData<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    data: StartResponseData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponseData {
    staged_repository_id: String,
}

#[derive(Debug, Serialize)]
struct BulkRequest<'a> {
    data: BulkRequestData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkRequestData<'a> {
    staged_repository_ids: Vec<&'a str>,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryStatusResponse {
    #[allow(dead_code)]
    repository_id: String,
    transitioning: bool,
    #[serde(rename = "type")]
    state: String,
}

impl RepositoryStatusResponse {
    fn into_status(self) -> Result<StagingStatus> {
        let state = match self.state.as_str() {
            "OPEN" => StagingState::Open,
            "CLOSED" => StagingState::Closed,
            "RELEASED" => StagingState::Released,
            "DROPPED" => StagingState::Dropped,
            other => {
                return Err(ReleaseError::Protocol(format!(
                    "unknown staging repository state: {other}"
                )))
            }
        };
        Ok(StagingStatus {
            state,
            transitioning: self.transitioning,
        })
    }
}

/// Staging client backed by a Nexus staging repository manager.
pub struct NexusStagingClient {
    config: NexusConfig,
    http: reqwest::Client,
}

impl NexusStagingClient {
    pub fn new(config: NexusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("shipway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                ReleaseError::RemoteUnavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.config.username, &self.config.password) {
            (Some(username), password) => request.basic_auth(username, password.as_deref()),
            _ => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| ReleaseError::RemoteUnavailable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                Err(ReleaseError::StagingConflict(body))
            }
            status if status.is_server_error() => Err(ReleaseError::RemoteUnavailable(format!(
                "staging manager returned {status}"
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ReleaseError::Protocol(format!(
                    "staging manager returned {status}: {body}"
                )))
            }
        }
    }

    /// Resolve the configured staging profile to its remote id.
    async fn profile_id(&self) -> Result<String> {
        let response = self.send(self.http.get(self.url("staging/profiles/"))).await?;
        let profiles: ProfileListResponse = response
            .json()
            .await
            .map_err(|err| ReleaseError::Protocol(format!("unreadable profile list: {err}")))?;

        match &self.config.staging_profile {
            Some(name) => profiles
                .data
                .into_iter()
                .find(|p| &p.name == name)
                .map(|p| p.id)
                .ok_or_else(|| {
                    ReleaseError::Protocol(format!("staging profile not found: {name}"))
                }),
            None => match profiles.data.as_slice() {
                [only] => Ok(only.id.clone()),
                [] => Err(ReleaseError::Protocol(
                    "no staging profiles available".to_string(),
                )),
                many => Err(ReleaseError::Protocol(format!(
                    "{} staging profiles available, configure one explicitly",
                    many.len()
                ))),
            },
        }
    }

    async fn bulk(&self, operation: &str, id: &RepositoryId) -> Result<()> {
        let body = BulkRequest {
            data: BulkRequestData {
                staged_repository_ids: vec![id.as_str()],
                description: &self.config.description,
            },
        };
        debug!(repository = %id, operation, "bulk staging request");
        self.send(
            self.http
                .post(self.url(&format!("staging/bulk/{operation}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StagingClient for NexusStagingClient {
    async fn create(&self) -> Result<RepositoryId> {
        let profile_id = self.profile_id().await?;
        let body = StartRequest {
            data: StartRequestData {
                description: &self.config.description,
            },
        };
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("staging/profiles/{profile_id}/start")))
                    .json(&body),
            )
            .await?;
        let started: StartResponse = response
            .json()
            .await
            .map_err(|err| ReleaseError::Protocol(format!("unreadable start response: {err}")))?;
        info!(
            profile = %profile_id,
            repository = %started.data.staged_repository_id,
            "staging repository created"
        );
        Ok(RepositoryId(started.data.staged_repository_id))
    }

    async fn status(&self, id: &RepositoryId) -> Result<StagingStatus> {
        let response = self
            .send(self.http.get(self.url(&format!("staging/repository/{id}"))))
            .await?;
        let status: RepositoryStatusResponse = response
            .json()
            .await
            .map_err(|err| ReleaseError::Protocol(format!("unreadable status response: {err}")))?;
        status.into_status()
    }

    async fn close(&self, id: &RepositoryId) -> Result<()> {
        self.bulk("close", id).await
    }

    async fn promote(&self, id: &RepositoryId) -> Result<()> {
        self.bulk("promote", id).await
    }

    async fn drop_repository(&self, id: &RepositoryId) -> Result<()> {
        self.bulk("drop", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_list_wire_format() {
        let parsed: ProfileListResponse =
            serde_json::from_str(r#"{"data": [{"id":"1", "name": "test"}]}"#).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].id, "1");
        assert_eq!(parsed.data[0].name, "test");
    }

    #[test]
    fn test_start_response_wire_format() {
        let parsed: StartResponse =
            serde_json::from_str(r#"{"data":{"stagedRepositoryId":"1"}}"#).unwrap();
        assert_eq!(parsed.data.staged_repository_id, "1");
    }

    #[test]
    fn test_repository_status_wire_format() {
        let parsed: RepositoryStatusResponse = serde_json::from_str(
            r#"{"repositoryId":"1", "transitioning": false, "type": "OPEN"}"#,
        )
        .unwrap();
        let status = parsed.into_status().unwrap();
        assert_eq!(status.state, StagingState::Open);
        assert!(!status.transitioning);
    }

    #[test]
    fn test_unknown_state_is_a_protocol_error() {
        let parsed: RepositoryStatusResponse = serde_json::from_str(
            r#"{"repositoryId":"1", "transitioning": true, "type": "PURGING"}"#,
        )
        .unwrap();
        assert!(matches!(
            parsed.into_status(),
            Err(ReleaseError::Protocol(_))
        ));
    }

    #[test]
    fn test_bulk_request_wire_format() {
        let body = BulkRequest {
            data: BulkRequestData {
                staged_repository_ids: vec!["1"],
                description: "shipway release",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"]["stagedRepositoryIds"][0], "1");
        assert_eq!(json["data"]["description"], "shipway release");
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let config = NexusConfig::new("https://nexus.example.com/service/local/");
        assert_eq!(config.base_url, "https://nexus.example.com/service/local");
    }
}
