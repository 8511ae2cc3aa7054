//! Filesystem artifact source: serves build outputs declared in the
//! manifest.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use shipway_core::{ArtifactSource, ArtifactSpec, ModuleDescriptor, ReleaseError, Result};

use crate::manifest::Manifest;

/// Keys into the per-module file map: artifact key, descriptor or marker
/// descriptor.
const DESCRIPTOR_KEY: &str = "pom";
const MARKER_DESCRIPTOR_KEY: &str = "marker-pom";

/// Reads artifact payloads from the paths declared in the manifest.
pub struct FsArtifactSource {
    /// `(coordinates, key) -> path` for every declared file.
    files: HashMap<(String, String), PathBuf>,
}

impl FsArtifactSource {
    pub fn from_manifest(manifest: &Manifest) -> anyhow::Result<Self> {
        let mut files = HashMap::new();
        for module in &manifest.modules {
            let coordinates = module.coordinates();
            for artifact in &module.artifacts {
                files.insert(
                    (coordinates.clone(), artifact.spec()?.key()),
                    artifact.file.clone(),
                );
            }
            if let Some(descriptor) = &module.descriptor {
                files.insert(
                    (coordinates.clone(), DESCRIPTOR_KEY.to_string()),
                    descriptor.clone(),
                );
            }
            if let Some(marker) = &module.marker_descriptor {
                files.insert(
                    (coordinates.clone(), MARKER_DESCRIPTOR_KEY.to_string()),
                    marker.clone(),
                );
            }
        }
        Ok(Self { files })
    }

    async fn read(&self, module: &ModuleDescriptor, key: &str) -> Result<Vec<u8>> {
        let coordinates = module.coordinates();
        let path = self
            .files
            .get(&(coordinates.clone(), key.to_string()))
            .ok_or_else(|| ReleaseError::ArtifactSource {
                module: coordinates.clone(),
                reason: format!("{key} is not declared in the manifest"),
            })?;
        debug!(module = %coordinates, key, path = %path.display(), "reading artifact");
        tokio::fs::read(path)
            .await
            .map_err(|err| ReleaseError::ArtifactSource {
                module: coordinates,
                reason: format!("{}: {err}", path.display()),
            })
    }
}

#[async_trait]
impl ArtifactSource for FsArtifactSource {
    async fn artifact(&self, module: &ModuleDescriptor, artifact: &ArtifactSpec) -> Result<Vec<u8>> {
        self.read(module, &artifact.key()).await
    }

    async fn descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>> {
        self.read(module, DESCRIPTOR_KEY).await
    }

    async fn marker_descriptor(&self, module: &ModuleDescriptor) -> Result<Vec<u8>> {
        self.read(module, MARKER_DESCRIPTOR_KEY).await
    }
}
