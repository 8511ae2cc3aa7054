//! Staging repository manager seam.
//!
//! [`StagingClient`] is a thin state-query/mutate wrapper around the remote
//! staging manager's operations (create, status, close, promote, drop). It
//! owns no business logic; the lifecycle coordinator drives it. Backends are
//! injected (`shipway-nexus` for the real thing, in-memory fakes for tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

/// Identifier of a remote staging repository, assigned by the remote at
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub String);

impl RepositoryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote staging repository state.
///
/// Transitions are monotonic (`Open -> Closed -> Released`) except
/// [`StagingState::Dropped`], which is reachable from `Open` or `Closed`
/// when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingState {
    Open,
    Closed,
    Released,
    Dropped,
}

impl StagingState {
    pub fn name(&self) -> &'static str {
        match self {
            StagingState::Open => "open",
            StagingState::Closed => "closed",
            StagingState::Released => "released",
            StagingState::Dropped => "dropped",
        }
    }

    /// Whether `self` already covers `target` on the monotonic path, i.e.
    /// re-requesting `target` would be a no-op to observe, not a mutation.
    pub fn satisfies(&self, target: StagingState) -> bool {
        match target {
            StagingState::Open => matches!(
                self,
                StagingState::Open | StagingState::Closed | StagingState::Released
            ),
            StagingState::Closed => {
                matches!(self, StagingState::Closed | StagingState::Released)
            }
            StagingState::Released => matches!(self, StagingState::Released),
            StagingState::Dropped => matches!(self, StagingState::Dropped),
        }
    }
}

impl std::fmt::Display for StagingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Point-in-time status of a staging repository as reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingStatus {
    pub state: StagingState,

    /// The remote is still moving between states; the reported state is the
    /// one it is leaving.
    pub transitioning: bool,
}

impl StagingStatus {
    /// A settled status in the given state.
    pub fn settled(state: StagingState) -> Self {
        Self {
            state,
            transitioning: false,
        }
    }
}

/// Narrow RPC facade over the remote staging repository manager.
///
/// All methods fail with [`crate::domain::ReleaseError::RemoteUnavailable`]
/// on transport failure, distinct from a well-formed error status body.
/// `create` fails with `StagingConflict` when the profile already has an
/// open repository (the remote enforces one-open-repository-per-profile;
/// this layer relies on that rather than re-implementing it).
#[async_trait]
pub trait StagingClient: Send + Sync {
    /// Create a staging repository and return its remote-assigned id.
    async fn create(&self) -> Result<RepositoryId>;

    /// Query current repository status. Idempotent read; callers may retry
    /// it with bounded backoff.
    async fn status(&self, id: &RepositoryId) -> Result<StagingStatus>;

    /// Request the `Open -> Closed` transition. The remote acknowledges and
    /// transitions asynchronously; callers poll [`StagingClient::status`].
    async fn close(&self, id: &RepositoryId) -> Result<()>;

    /// Request the `Closed -> Released` transition.
    async fn promote(&self, id: &RepositoryId) -> Result<()>;

    /// Drop the repository, discarding staged content. Named to stay clear
    /// of `Drop::drop` on trait objects.
    async fn drop_repository(&self, id: &RepositoryId) -> Result<()>;

    /// Repository-relative upload root for publishing into the given
    /// staging repository.
    fn deploy_target(&self, id: &RepositoryId) -> String {
        format!("staging/deployByRepositoryId/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_satisfies_is_monotonic() {
        assert!(StagingState::Closed.satisfies(StagingState::Closed));
        assert!(StagingState::Released.satisfies(StagingState::Closed));
        assert!(!StagingState::Open.satisfies(StagingState::Closed));
        assert!(!StagingState::Closed.satisfies(StagingState::Released));
        assert!(!StagingState::Dropped.satisfies(StagingState::Closed));
    }

    #[test]
    fn test_settled_status() {
        let status = StagingStatus::settled(StagingState::Released);
        assert!(!status.transitioning);
        assert_eq!(status.state, StagingState::Released);
    }
}
