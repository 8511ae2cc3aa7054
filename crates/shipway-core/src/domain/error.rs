//! Error taxonomy for staged release runs.
//!
//! The variants map one-to-one onto the recovery policies the orchestrator
//! applies: planning errors are returned before any remote I/O, publication
//! errors are collected per module at the fan-out join, staging conflicts
//! and timeouts abort the remaining plan immediately, and remote transport
//! errors are retried only for idempotent status reads.

use thiserror::Error;

/// Errors produced by the release orchestration layer.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Bad input; no remote I/O was performed. Fixed by configuration,
    /// never retried automatically.
    #[error("planning failed: {0}")]
    Planning(String),

    /// A module's publication failed. Isolated to that module; sibling
    /// modules are not aborted.
    #[error("publication failed for module {module}: {reason}")]
    Publication { module: String, reason: String },

    /// Another staging repository is already open for this profile.
    /// Fatal to the run, not retried.
    #[error("staging conflict: {0}")]
    StagingConflict(String),

    /// A staging transition did not settle within the polling budget. The
    /// repository is left in its last observed state, never guessed.
    #[error(
        "staging {operation} did not settle within {waited_ms}ms (last observed state: {last_state})"
    )]
    StagingTimeout {
        operation: String,
        waited_ms: u64,
        last_state: String,
    },

    /// Transport-level failure talking to the remote, distinct from a
    /// well-formed error status body.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote answered, but not with anything this client understands.
    #[error("unexpected remote response: {0}")]
    Protocol(String),

    /// Signing a payload failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// An artifact declared by a module descriptor could not be loaded.
    #[error("artifact source error for module {module}: {reason}")]
    ArtifactSource { module: String, reason: String },

    /// The run was aborted by the operator. An open staging repository is
    /// dropped best-effort before this is returned.
    #[error("release run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReleaseError {
    /// Whether this error aborts the remaining plan (as opposed to being
    /// collected per module at the join).
    pub fn is_lifecycle_fatal(&self) -> bool {
        matches!(
            self,
            ReleaseError::StagingConflict(_)
                | ReleaseError::StagingTimeout { .. }
                | ReleaseError::RemoteUnavailable(_)
                | ReleaseError::Cancelled
        )
    }
}

/// Result type for release orchestration operations.
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_error_names_the_module() {
        let err = ReleaseError::Publication {
            module: "com.acme:lib".to_string(),
            reason: "PUT returned 503".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("com.acme:lib"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_timeout_error_reports_last_observed_state() {
        let err = ReleaseError::StagingTimeout {
            operation: "close".to_string(),
            waited_ms: 30_000,
            last_state: "open".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("close"));
        assert!(msg.contains("30000ms"));
        assert!(msg.contains("open"));
    }

    #[test]
    fn test_lifecycle_fatal_classification() {
        assert!(ReleaseError::StagingConflict("profile busy".into()).is_lifecycle_fatal());
        assert!(ReleaseError::RemoteUnavailable("connection refused".into()).is_lifecycle_fatal());
        assert!(ReleaseError::Cancelled.is_lifecycle_fatal());
        assert!(!ReleaseError::Publication {
            module: "a:b".into(),
            reason: "x".into()
        }
        .is_lifecycle_fatal());
        assert!(!ReleaseError::Planning("no version".into()).is_lifecycle_fatal());
    }
}
