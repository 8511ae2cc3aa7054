//! In-memory fakes for the collaborator seams (testing only).
//!
//! Provides `MemoryStagingClient`, `MemoryArtifactStore`,
//! `MemoryArtifactSource` and `StubSigner` that satisfy the trait contracts
//! without any remote dependencies, plus failure injection for the
//! scenarios the coordinator has to survive.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::{RepositoryId, StagingClient, StagingState, StagingStatus};
use crate::domain::{ArtifactSpec, ModuleDescriptor, ReleaseError, Result};
use crate::signing::SigningProvider;
use crate::store::{ArtifactSource, ArtifactStore};

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory artifact repository backed by a `HashMap<path, bytes>`.
///
/// `fail_on(substr)` makes every subsequent `put` whose path contains the
/// substring fail with a transport error.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_substrings: Mutex<Vec<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a transport failure for paths containing `substring`.
    pub async fn fail_on(&self, substring: &str) {
        self.fail_substrings.lock().await.push(substring.to_string());
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.files.lock().await.contains_key(path)
    }

    pub async fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        for substring in self.fail_substrings.lock().await.iter() {
            if path.contains(substring.as_str()) {
                return Err(ReleaseError::RemoteUnavailable(format!(
                    "injected transport failure for {path}"
                )));
            }
        }
        self.files
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock().await.get(path).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactSource
// ---------------------------------------------------------------------------

/// Artifact source that synthesizes deterministic payloads for every
/// declared artifact. Individual payloads can be removed to simulate a
/// build that did not produce them.
#[derive(Debug, Default)]
pub struct MemoryArtifactSource {
    missing: Mutex<HashSet<(String, String)>>,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given artifact of `coordinates` unavailable. `key` is the
    /// artifact key (`jar`, `sources.jar`, ...), `pom` or `marker-pom`.
    pub async fn remove(&self, coordinates: &str, key: &str) {
        self.missing
            .lock()
            .await
            .insert((coordinates.to_string(), key.to_string()));
    }

    async fn lookup(&self, module: &ModuleDescriptor, key: &str) -> Result<Vec<u8>> {
        let coordinates = module.coordinates();
        if self
            .missing
            .lock()
            .await
            .contains(&(coordinates.clone(), key.to_string()))
        {
            return Err(ReleaseError::ArtifactSource {
                module: coordinates,
                reason: format!("{key} not produced by the build"),
            });
        }
        Ok(format!("{coordinates}:{key}").into_bytes())
    }
}

#[async_trait]
impl ArtifactSource for MemoryArtifactSource {
    async fn artifact(
        &self,
        module: &ModuleDescriptor,
        artifact: &ArtifactSpec,
    ) -> Result<Vec<u8>> {
        self.lookup(module, &artifact.key()).await
    }

    async fn descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>> {
        self.lookup(module, "pom").await
    }

    async fn marker_descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>> {
        self.lookup(module, "marker-pom").await
    }
}

// ---------------------------------------------------------------------------
// StubSigner
// ---------------------------------------------------------------------------

/// Signer that produces a recognizable fake signature, with optional
/// failure injection.
#[derive(Debug, Default)]
pub struct StubSigner {
    sign_calls: Mutex<u32>,
    fail_reason: Mutex<Option<String>>,
}

impl StubSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sign_calls(&self) -> u32 {
        *self.sign_calls.lock().await
    }

    /// Make every subsequent `sign` call fail with the given reason.
    pub async fn fail_with(&self, reason: &str) {
        *self.fail_reason.lock().await = Some(reason.to_string());
    }
}

#[async_trait]
impl SigningProvider for StubSigner {
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        *self.sign_calls.lock().await += 1;
        if let Some(reason) = self.fail_reason.lock().await.clone() {
            return Err(ReleaseError::Signing(reason));
        }
        let mut signature = b"-----STUB SIGNATURE-----\n".to_vec();
        signature.extend_from_slice(&data[..data.len().min(8)]);
        Ok(signature)
    }
}

// ---------------------------------------------------------------------------
// MemoryStagingClient
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StagedRepo {
    id: String,
    state: StagingState,
    /// State the repo settles into once `polls_left` reaches zero.
    pending: Option<StagingState>,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct StagingInner {
    repo: Option<StagedRepo>,
    profile_busy: bool,
    settle_after_polls: u32,
    never_settle: bool,
    fail_drop: bool,
    status_failures_left: u32,
    create_calls: u32,
    status_calls: u32,
    close_calls: u32,
    promote_calls: u32,
    drop_calls: u32,
}

/// In-memory staging repository manager enforcing
/// one-open-repository-per-profile, with configurable transition latency.
#[derive(Debug, Default)]
pub struct MemoryStagingClient {
    inner: Mutex<StagingInner>,
}

impl MemoryStagingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of status polls a close/promote stays `transitioning`.
    pub async fn settle_after_polls(&self, polls: u32) {
        self.inner.lock().await.settle_after_polls = polls;
    }

    /// Make transitions never settle, for timeout tests.
    pub async fn never_settle(&self) {
        self.inner.lock().await.never_settle = true;
    }

    /// Simulate another run already holding the staging profile.
    pub async fn occupy_profile(&self) {
        self.inner.lock().await.profile_busy = true;
    }

    /// Make drop requests fail, for drop-failure reporting tests.
    pub async fn fail_drop(&self) {
        self.inner.lock().await.fail_drop = true;
    }

    /// Make the next `count` status queries fail with a transport error.
    pub async fn fail_status_times(&self, count: u32) {
        self.inner.lock().await.status_failures_left = count;
    }

    pub async fn current_state(&self) -> Option<StagingState> {
        self.inner.lock().await.repo.as_ref().map(|r| r.state)
    }

    pub async fn status_calls(&self) -> u32 {
        self.inner.lock().await.status_calls
    }

    pub async fn close_calls(&self) -> u32 {
        self.inner.lock().await.close_calls
    }

    pub async fn promote_calls(&self) -> u32 {
        self.inner.lock().await.promote_calls
    }

    pub async fn drop_calls(&self) -> u32 {
        self.inner.lock().await.drop_calls
    }
}

#[async_trait]
impl StagingClient for MemoryStagingClient {
    async fn create(&self) -> Result<RepositoryId> {
        let mut inner = self.inner.lock().await;
        if inner.profile_busy {
            return Err(ReleaseError::StagingConflict(
                "profile already has an open staging repository".to_string(),
            ));
        }
        if let Some(repo) = &inner.repo {
            if repo.state == StagingState::Open {
                return Err(ReleaseError::StagingConflict(format!(
                    "staging repository {} is already open",
                    repo.id
                )));
            }
        }
        inner.create_calls += 1;
        let id = format!("shipway-{}", 1000 + inner.create_calls);
        inner.repo = Some(StagedRepo {
            id: id.clone(),
            state: StagingState::Open,
            pending: None,
            polls_left: 0,
        });
        Ok(RepositoryId(id))
    }

    async fn status(&self, id: &RepositoryId) -> Result<StagingStatus> {
        let mut inner = self.inner.lock().await;
        inner.status_calls += 1;
        if inner.status_failures_left > 0 {
            inner.status_failures_left -= 1;
            return Err(ReleaseError::RemoteUnavailable(
                "injected status failure".to_string(),
            ));
        }
        let never_settle = inner.never_settle;
        let repo = inner
            .repo
            .as_mut()
            .filter(|r| r.id == id.0)
            .ok_or_else(|| {
                ReleaseError::Protocol(format!("unknown staging repository: {id}"))
            })?;

        if let Some(pending) = repo.pending {
            if never_settle {
                return Ok(StagingStatus {
                    state: repo.state,
                    transitioning: true,
                });
            }
            if repo.polls_left > 0 {
                repo.polls_left -= 1;
                return Ok(StagingStatus {
                    state: repo.state,
                    transitioning: true,
                });
            }
            repo.state = pending;
            repo.pending = None;
        }
        Ok(StagingStatus::settled(repo.state))
    }

    async fn close(&self, id: &RepositoryId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.close_calls += 1;
        let settle = inner.settle_after_polls;
        let repo = inner
            .repo
            .as_mut()
            .filter(|r| r.id == id.0)
            .ok_or_else(|| {
                ReleaseError::Protocol(format!("unknown staging repository: {id}"))
            })?;
        repo.pending = Some(StagingState::Closed);
        repo.polls_left = settle;
        Ok(())
    }

    async fn promote(&self, id: &RepositoryId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.promote_calls += 1;
        let settle = inner.settle_after_polls;
        let repo = inner
            .repo
            .as_mut()
            .filter(|r| r.id == id.0)
            .ok_or_else(|| {
                ReleaseError::Protocol(format!("unknown staging repository: {id}"))
            })?;
        if repo.state != StagingState::Closed && repo.pending != Some(StagingState::Closed) {
            return Err(ReleaseError::Protocol(format!(
                "cannot promote repository {id} from state {}",
                repo.state
            )));
        }
        repo.pending = Some(StagingState::Released);
        repo.polls_left = settle;
        Ok(())
    }

    async fn drop_repository(&self, id: &RepositoryId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.drop_calls += 1;
        if inner.fail_drop {
            return Err(ReleaseError::RemoteUnavailable(
                "injected drop failure".to_string(),
            ));
        }
        let repo = inner
            .repo
            .as_mut()
            .filter(|r| r.id == id.0)
            .ok_or_else(|| {
                ReleaseError::Protocol(format!("unknown staging repository: {id}"))
            })?;
        repo.pending = None;
        repo.state = StagingState::Dropped;
        Ok(())
    }
}
