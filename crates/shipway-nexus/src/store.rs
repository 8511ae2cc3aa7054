//! HTTP artifact transfer: PUT/GET against the repository's content root.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use shipway_core::{ArtifactStore, ReleaseError, Result};

/// Artifact store that uploads and fetches files over plain HTTP, with
/// optional basic authentication. `path` arguments are repository-relative
/// (`staging/deployByRepositoryId/{id}/group/.../file.jar`).
pub struct HttpArtifactStore {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("shipway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                ReleaseError::RemoteUnavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: None,
            password: None,
            http,
        })
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.username, &self.password) {
            (Some(username), password) => request.basic_auth(username, password.as_deref()),
            _ => request,
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let url = self.url(path);
        debug!(%url, size = bytes.len(), "uploading file");
        let response = self
            .authorize(self.http.put(&url).body(bytes.to_vec()))
            .send()
            .await
            .map_err(|err| ReleaseError::RemoteUnavailable(err.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(ReleaseError::RemoteUnavailable(format!(
            "upload of {path} rejected with {}",
            response.status()
        )))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let url = self.url(path);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|err| ReleaseError::RemoteUnavailable(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| ReleaseError::RemoteUnavailable(err.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(ReleaseError::RemoteUnavailable(format!(
                "fetch of {path} rejected with {status}"
            ))),
        }
    }
}
