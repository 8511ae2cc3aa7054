//! Transport seams used by the artifact publisher.
//!
//! [`ArtifactStore`] is the narrow write surface of the target repository
//! (HTTP PUT in `shipway-nexus`, an in-memory map in the fakes).
//! [`ArtifactSource`] supplies the bytes the build produced; how artifacts
//! are compiled or descriptors are generated is not this crate's concern.

use async_trait::async_trait;

use crate::domain::{ArtifactSpec, ModuleDescriptor, Result};

/// Write/read surface of a target artifact repository.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `bytes` to the repository-relative `path`.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the file at `path`, or `None` if it does not exist. Used to
    /// read the current version index before rewriting it.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Supplies the payloads of a module's declared publications.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Bytes of one declared artifact of `module`.
    async fn artifact(&self, module: &ModuleDescriptor, artifact: &ArtifactSpec)
        -> Result<Vec<u8>>;

    /// The module's machine-readable coordinate descriptor (POM
    /// equivalent), published after all classified artifacts.
    async fn descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>>;

    /// Descriptor of the module's marker publication. Only called for
    /// modules that register a marker.
    async fn marker_descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>>;
}
