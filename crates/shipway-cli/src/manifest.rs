//! The `shipway.toml` release manifest.
//!
//! Declares the target repository, signing configuration and the modules
//! to publish, with file paths for every artifact. Paths are resolved
//! relative to the manifest's directory.
//!
//! ```toml
//! [repository]
//! url = "https://nexus.example.com/service/local"
//! staging_profile = "com.acme"
//! snapshot_repository = "snapshots"
//!
//! [signing]
//! key_id = "0xDEADBEEF"
//!
//! [[modules]]
//! group = "com.acme"
//! module = "acme-plugin"
//! version = "1.4.0"
//! descriptor = "build/publications/acme-plugin.pom"
//! plugin_id = "com.acme.example"
//! marker_descriptor = "build/publications/acme-plugin-marker.pom"
//!
//! [[modules.artifacts]]
//! file = "build/libs/acme-plugin-1.4.0.jar"
//!
//! [[modules.artifacts]]
//! file = "build/libs/acme-plugin-1.4.0-sources.jar"
//! classifier = "sources"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use shipway_core::{ArtifactSpec, ModuleDescriptor};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Base URL of the target repository manager.
    pub url: String,

    /// Staging profile name for candidate/final releases.
    #[serde(default)]
    pub staging_profile: Option<String>,

    /// Repository-relative upload root for snapshot publishes.
    #[serde(default)]
    pub snapshot_repository: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// GPG key id. Signing is disabled when unset.
    #[serde(default)]
    pub key_id: Option<String>,

    /// Signing command to invoke.
    #[serde(default = "default_gpg_command")]
    pub command: String,
}

fn default_gpg_command() -> String {
    "gpg".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    pub group: String,
    pub module: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Path to the module descriptor (`.pom`) produced by the build.
    #[serde(default)]
    pub descriptor: Option<PathBuf>,

    /// Plugin id; registers a marker publication under
    /// `{plugin_id}:{plugin_id}.gradle.plugin`.
    #[serde(default)]
    pub plugin_id: Option<String>,

    /// Path to the marker descriptor. Required when `plugin_id` is set.
    #[serde(default)]
    pub marker_descriptor: Option<PathBuf>,

    #[serde(default)]
    pub artifacts: Vec<ArtifactConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactConfig {
    /// Path to the artifact file produced by the build.
    pub file: PathBuf,

    /// Extension; derived from `file` when omitted.
    #[serde(default)]
    pub extension: Option<String>,

    #[serde(default)]
    pub classifier: Option<String>,
}

impl ArtifactConfig {
    pub fn spec(&self) -> Result<ArtifactSpec> {
        let extension = match &self.extension {
            Some(extension) => extension.clone(),
            None => self
                .file
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string)
                .with_context(|| {
                    format!("artifact {} has no derivable extension", self.file.display())
                })?,
        };
        Ok(match &self.classifier {
            Some(classifier) => ArtifactSpec::classified(classifier, extension),
            None => ArtifactSpec::new(extension),
        })
    }
}

impl ModuleConfig {
    pub fn coordinates(&self) -> String {
        format!("{}:{}", self.group, self.module)
    }

    /// Build the descriptor for this module, applying `version_override`
    /// when the module does not pin a version itself.
    pub fn descriptor_for(&self, version_override: Option<&str>) -> Result<ModuleDescriptor> {
        let mut module = ModuleDescriptor::new(&self.group, &self.module);
        if let Some(version) = self.version.as_deref().or(version_override) {
            module = module.with_version(version);
        }
        for artifact in &self.artifacts {
            module = module.with_artifact(artifact.spec()?);
        }
        if let Some(plugin_id) = &self.plugin_id {
            module = module.with_plugin_marker(plugin_id);
        }
        Ok(module)
    }
}

impl Manifest {
    /// Load and validate a manifest, resolving artifact paths against its
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest: Manifest = toml::from_str(&text)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.resolve_paths(base);
        manifest.validate()?;
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&p);
            }
        };
        for module in &mut self.modules {
            if let Some(descriptor) = &mut module.descriptor {
                resolve(descriptor);
            }
            if let Some(marker) = &mut module.marker_descriptor {
                resolve(marker);
            }
            for artifact in &mut module.artifacts {
                resolve(&mut artifact.file);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            bail!("manifest declares no modules");
        }
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.coordinates()) {
                bail!("duplicate module coordinates: {}", module.coordinates());
            }
            if module.plugin_id.is_some() && module.marker_descriptor.is_none() {
                bail!(
                    "module {} declares a plugin id without a marker descriptor",
                    module.coordinates()
                );
            }
            if !module.artifacts.is_empty() && module.descriptor.is_none() {
                bail!(
                    "module {} declares artifacts without a descriptor",
                    module.coordinates()
                );
            }
        }
        Ok(())
    }

    /// Module descriptors for a run, with an optional version override for
    /// modules that do not pin one.
    pub fn module_descriptors(&self, version_override: Option<&str>) -> Result<Vec<ModuleDescriptor>> {
        self.modules
            .iter()
            .map(|m| m.descriptor_for(version_override))
            .collect()
    }

    pub fn signing_enabled(&self) -> bool {
        self.signing.key_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[repository]
url = "https://nexus.example.com/service/local"
staging_profile = "com.acme"
snapshot_repository = "snapshots"

[signing]
key_id = "0xDEADBEEF"

[[modules]]
group = "com.acme"
module = "acme-plugin"
version = "1.4.0"
descriptor = "build/publications/acme-plugin.pom"
plugin_id = "com.acme.example"
marker_descriptor = "build/publications/acme-plugin-marker.pom"

[[modules.artifacts]]
file = "build/libs/acme-plugin-1.4.0.jar"

[[modules.artifacts]]
file = "build/libs/acme-plugin-1.4.0-sources.jar"
classifier = "sources"
"#;

    fn write_manifest(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipway.toml");
        std::fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_resolves_paths_and_builds_descriptors() {
        let (dir, path) = write_manifest(MANIFEST);
        let manifest = Manifest::load(&path).unwrap();

        assert!(manifest.signing_enabled());
        assert_eq!(manifest.repository.staging_profile.as_deref(), Some("com.acme"));

        let modules = manifest.module_descriptors(None).unwrap();
        assert_eq!(modules.len(), 1);
        let module = &modules[0];
        assert_eq!(module.coordinates(), "com.acme:acme-plugin");
        assert_eq!(module.version.as_deref(), Some("1.4.0"));
        assert_eq!(module.artifacts.len(), 2);
        assert_eq!(module.artifacts[1].key(), "sources.jar");
        assert!(module.marker.is_some());

        // Relative paths are anchored at the manifest's directory.
        assert_eq!(
            manifest.modules[0].artifacts[0].file,
            dir.path().join("build/libs/acme-plugin-1.4.0.jar")
        );
    }

    #[test]
    fn test_version_override_applies_to_unpinned_modules() {
        let manifest: Manifest = toml::from_str(
            r#"
[repository]
url = "https://nexus.example.com"

[[modules]]
group = "com.acme"
module = "lib"
descriptor = "lib.pom"

[[modules.artifacts]]
file = "lib.jar"
"#,
        )
        .unwrap();
        let modules = manifest.module_descriptors(Some("2.0.0")).unwrap();
        assert_eq!(modules[0].version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_plugin_id_requires_marker_descriptor() {
        let text = r#"
[repository]
url = "https://nexus.example.com"

[[modules]]
group = "com.acme"
module = "acme-plugin"
plugin_id = "com.acme.example"
"#;
        let (_dir, path) = write_manifest(text);
        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("marker descriptor"));
    }

    #[test]
    fn test_duplicate_coordinates_rejected() {
        let text = r#"
[repository]
url = "https://nexus.example.com"

[[modules]]
group = "com.acme"
module = "lib"

[[modules]]
group = "com.acme"
module = "lib"
"#;
        let (_dir, path) = write_manifest(text);
        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate module coordinates"));
    }

    #[test]
    fn test_extension_derived_from_file_name() {
        let artifact = ArtifactConfig {
            file: PathBuf::from("build/libs/lib-1.0.0.jar"),
            extension: None,
            classifier: None,
        };
        assert_eq!(artifact.spec().unwrap().extension, "jar");
    }
}
