//! Version resolution seam.
//!
//! Version and channel derivation from source-control history is an opaque
//! upstream input; the orchestrator only consumes the resolved pair.

use async_trait::async_trait;

use crate::domain::{ReleaseChannel, Result};

/// Resolves the version and channel for a release run.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve(&self) -> Result<(String, ReleaseChannel)>;
}

/// A pre-resolved version, used when the caller already knows the answer
/// (e.g. a CI pipeline passing an explicit tag).
#[derive(Debug, Clone)]
pub struct FixedVersion {
    pub version: String,
    pub channel: ReleaseChannel,
}

impl FixedVersion {
    pub fn new(version: impl Into<String>, channel: ReleaseChannel) -> Self {
        Self {
            version: version.into(),
            channel,
        }
    }
}

#[async_trait]
impl VersionResolver for FixedVersion {
    async fn resolve(&self) -> Result<(String, ReleaseChannel)> {
        Ok((self.version.clone(), self.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_version_resolves_verbatim() {
        let resolver = FixedVersion::new("1.4.0-rc.1", ReleaseChannel::Candidate);
        let (version, channel) = resolver.resolve().await.unwrap();
        assert_eq!(version, "1.4.0-rc.1");
        assert_eq!(channel, ReleaseChannel::Candidate);
    }
}
