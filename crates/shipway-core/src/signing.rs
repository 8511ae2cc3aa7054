//! Signing provider seam.
//!
//! Signing internals (key handling, the actual crypto) live behind this
//! trait. When no signing key is configured the planner marks Sign steps as
//! not applicable rather than attempting and skipping them.

use async_trait::async_trait;

use crate::domain::Result;

/// Produces detached signatures for artifact payloads.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// Whether a signing key is configured. When `false`, Sign steps are
    /// planned as not applicable and `sign` is never called.
    fn enabled(&self) -> bool {
        true
    }

    /// Produce a detached, armored signature for `data`.
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Provider used when no signing key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSigning;

#[async_trait]
impl SigningProvider for NoSigning {
    fn enabled(&self) -> bool {
        false
    }

    async fn sign(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(crate::domain::ReleaseError::Signing(
            "no signing key configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_signing_is_disabled_and_refuses_to_sign() {
        let signer = NoSigning;
        assert!(!signer.enabled());
        assert!(signer.sign(b"payload").await.is_err());
    }
}
