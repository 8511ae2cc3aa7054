//! Artifact publication: uploads one module's artifact set to a target
//! repository.
//!
//! For each declared artifact the publisher uploads the payload, its
//! checksum side-files and, when signing applies, the detached signature
//! (itself checksummed). The module descriptor is published only after all
//! classified artifacts succeed, and the per-module version index is
//! rewritten last. Marker publications are an independent unit: they may
//! fail without failing the module's primary publication.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    MarkerOutcome, ModuleDescriptor, PublicationResult, ReleaseError, Result,
};
use crate::domain::outcome::FileFailure;
use crate::layout::{checksum, RepositoryLayout, VersionIndex, CHECKSUM_EXTENSIONS, SIGNATURE_EXTENSION};
use crate::signing::SigningProvider;
use crate::store::{ArtifactSource, ArtifactStore};

/// Publishes one module's artifact set to a named target repository.
pub struct ArtifactPublisher {
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn ArtifactSource>,
    signer: Arc<dyn SigningProvider>,
}

impl ArtifactPublisher {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        source: Arc<dyn ArtifactSource>,
        signer: Arc<dyn SigningProvider>,
    ) -> Self {
        Self {
            store,
            source,
            signer,
        }
    }

    /// Whether the configured signing provider has a key.
    pub fn signing_enabled(&self) -> bool {
        self.signer.enabled()
    }

    /// Verify a module without touching the remote: the version must be
    /// resolvable and every declared payload loadable from the source.
    pub async fn verify(&self, module: &ModuleDescriptor) -> Result<()> {
        let version = resolved_version(module)?;
        debug!(module = %module.coordinates(), %version, "verifying module");

        for artifact in &module.artifacts {
            self.source.artifact(module, artifact).await?;
        }
        self.source.descriptor(module).await?;
        if module.marker.is_some() {
            self.source.marker_descriptor(module).await?;
        }
        Ok(())
    }

    /// Validate a module: verify, and exercise the signer over every
    /// payload when signing applies. Performs no uploads.
    pub async fn validate(&self, module: &ModuleDescriptor, sign: bool) -> Result<()> {
        let _ = resolved_version(module)?;
        for artifact in &module.artifacts {
            let bytes = self.source.artifact(module, artifact).await?;
            if sign {
                self.signer.sign(&bytes).await?;
            }
        }
        let descriptor = self.source.descriptor(module).await?;
        if sign {
            self.signer.sign(&descriptor).await?;
        }
        if module.marker.is_some() {
            let marker = self.source.marker_descriptor(module).await?;
            if sign {
                self.signer.sign(&marker).await?;
            }
        }
        info!(module = %module.coordinates(), "module validated");
        Ok(())
    }

    /// Publish a module's artifact set to `target_repository`.
    ///
    /// A transport failure on any primary file fails the module's
    /// publication entirely; no partial publication of a module is
    /// considered successful. The failure stays isolated to this module.
    pub async fn publish(
        &self,
        module: &ModuleDescriptor,
        target_repository: &str,
        sign: bool,
        release_pointer: bool,
    ) -> PublicationResult {
        let mut result = PublicationResult::new(module.coordinates());

        let version = match resolved_version(module) {
            Ok(version) => version,
            Err(err) => {
                result.failed.push(FileFailure {
                    path: module.coordinates(),
                    reason: err.to_string(),
                });
                return result;
            }
        };

        let layout = RepositoryLayout::new(target_repository);
        info!(
            module = %module.coordinates(),
            version = %version,
            repository = target_repository,
            "publishing module"
        );

        // Classified artifacts first; the descriptor is never published
        // before all of them succeed.
        for artifact in &module.artifacts {
            let file_name = artifact.file_name(&module.module, version);
            let path = layout.file_path(&module.group, &module.module, version, &file_name);
            let bytes = match self.source.artifact(module, artifact).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    result.failed.push(FileFailure {
                        path,
                        reason: err.to_string(),
                    });
                    return result;
                }
            };
            if let Err(failure) = self
                .put_with_side_files(&path, &bytes, sign, &mut result)
                .await
            {
                result.failed.push(failure);
                return result;
            }
        }

        let descriptor_path = layout.file_path(
            &module.group,
            &module.module,
            version,
            &format!("{}-{}.pom", module.module, version),
        );
        match self.source.descriptor(module).await {
            Ok(bytes) => {
                if let Err(failure) = self
                    .put_with_side_files(&descriptor_path, &bytes, sign, &mut result)
                    .await
                {
                    result.failed.push(failure);
                    return result;
                }
            }
            Err(err) => {
                result.failed.push(FileFailure {
                    path: descriptor_path,
                    reason: err.to_string(),
                });
                return result;
            }
        }

        if let Err(failure) = self
            .update_version_index(&layout, &module.group, &module.module, version, release_pointer, &mut result)
            .await
        {
            result.failed.push(failure);
            return result;
        }

        // The marker publication is its own unit under its own coordinates;
        // its failure is recorded separately and does not fail the module.
        if module.marker.is_some() {
            result.marker = Some(
                self.publish_marker(module, version, &layout, sign, release_pointer, &mut result)
                    .await,
            );
        }

        info!(
            module = %module.coordinates(),
            files = result.published.len(),
            "module published"
        );
        result
    }

    async fn publish_marker(
        &self,
        module: &ModuleDescriptor,
        version: &str,
        layout: &RepositoryLayout,
        sign: bool,
        release_pointer: bool,
        result: &mut PublicationResult,
    ) -> MarkerOutcome {
        let marker = module.marker.as_ref().expect("caller checked marker");
        let descriptor_path = layout.file_path(
            &marker.group,
            &marker.module,
            version,
            &format!("{}-{}.pom", marker.module, version),
        );

        let bytes = match self.source.marker_descriptor(module).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(module = %module.coordinates(), error = %err, "marker descriptor unavailable");
                return MarkerOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        if let Err(failure) = self
            .put_with_side_files(&descriptor_path, &bytes, sign, result)
            .await
        {
            warn!(module = %module.coordinates(), path = %failure.path, "marker publication failed");
            return MarkerOutcome::Failed {
                reason: failure.reason,
            };
        }

        if let Err(failure) = self
            .update_version_index(layout, &marker.group, &marker.module, version, release_pointer, result)
            .await
        {
            warn!(module = %module.coordinates(), path = %failure.path, "marker index update failed");
            return MarkerOutcome::Failed {
                reason: failure.reason,
            };
        }

        MarkerOutcome::Published
    }

    /// Upload one file plus its checksum side-files and, when signing
    /// applies, the detached signature with its own checksums.
    async fn put_with_side_files(
        &self,
        path: &str,
        bytes: &[u8],
        sign: bool,
        result: &mut PublicationResult,
    ) -> std::result::Result<(), FileFailure> {
        self.put_with_checksums(path, bytes, result).await?;

        if sign {
            let signature = match self.signer.sign(bytes).await {
                Ok(signature) => signature,
                Err(err) => {
                    result.sign_error = Some(err.to_string());
                    return Err(FileFailure {
                        path: format!("{path}.{SIGNATURE_EXTENSION}"),
                        reason: err.to_string(),
                    });
                }
            };
            self.put_with_checksums(
                &format!("{path}.{SIGNATURE_EXTENSION}"),
                &signature,
                result,
            )
            .await?;
        }
        Ok(())
    }

    async fn put_with_checksums(
        &self,
        path: &str,
        bytes: &[u8],
        result: &mut PublicationResult,
    ) -> std::result::Result<(), FileFailure> {
        self.put_one(path, bytes, result).await?;
        for extension in CHECKSUM_EXTENSIONS {
            let digest = checksum(extension, bytes).map_err(|err| FileFailure {
                path: format!("{path}.{extension}"),
                reason: err.to_string(),
            })?;
            self.put_one(&format!("{path}.{extension}"), digest.as_bytes(), result)
                .await?;
        }
        Ok(())
    }

    async fn put_one(
        &self,
        path: &str,
        bytes: &[u8],
        result: &mut PublicationResult,
    ) -> std::result::Result<(), FileFailure> {
        result.attempted.push(path.to_string());
        match self.store.put(path, bytes).await {
            Ok(()) => {
                result.published.push(path.to_string());
                Ok(())
            }
            Err(err) => Err(FileFailure {
                path: path.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Read-modify-write the per-module version index. Index files carry
    /// checksums but no signature.
    async fn update_version_index(
        &self,
        layout: &RepositoryLayout,
        group: &str,
        module: &str,
        version: &str,
        release_pointer: bool,
        result: &mut PublicationResult,
    ) -> std::result::Result<(), FileFailure> {
        let index_path = layout.version_index_path(group, module);
        let mut index = match self.store.get(&index_path).await {
            Ok(Some(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                match VersionIndex::parse(group, module, &text) {
                    Ok(index) => index,
                    Err(err) => {
                        warn!(path = %index_path, error = %err, "unreadable version index, rewriting");
                        VersionIndex::empty(group, module)
                    }
                }
            }
            Ok(None) => VersionIndex::empty(group, module),
            Err(err) => {
                return Err(FileFailure {
                    path: index_path,
                    reason: err.to_string(),
                })
            }
        };

        index.add_version(version, release_pointer);
        self.put_with_checksums(&index_path, index.to_xml().as_bytes(), result)
            .await
    }
}

fn resolved_version(module: &ModuleDescriptor) -> Result<&str> {
    match module.version.as_deref() {
        Some(version) if !version.is_empty() => Ok(version),
        _ => Err(ReleaseError::Publication {
            module: module.coordinates(),
            reason: "no resolvable version".to_string(),
        }),
    }
}
