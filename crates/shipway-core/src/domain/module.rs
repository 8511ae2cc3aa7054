//! Module descriptors: the publishable units of a release run.
//!
//! A [`ModuleDescriptor`] is created from build configuration before a run
//! starts and is read-only for the duration of the run.

use serde::{Deserialize, Serialize};

/// Marker-module suffix for externally-discoverable plugin identities.
///
/// A plugin with id `com.acme.example` registers its marker under the
/// coordinates `com.acme.example:com.acme.example.gradle.plugin`.
pub const MARKER_MODULE_SUFFIX: &str = ".gradle.plugin";

/// One classified artifact of a module (e.g. `sources.jar`, `javadoc.jar`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Optional classifier (`sources`, `javadoc`, ...). `None` for the
    /// primary artifact and for metadata files like `.module`.
    pub classifier: Option<String>,

    /// File extension (`jar`, `module`, ...).
    pub extension: String,
}

impl ArtifactSpec {
    /// Unclassified artifact with the given extension.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            classifier: None,
            extension: extension.into(),
        }
    }

    /// Classified artifact (e.g. `classified("sources", "jar")`).
    pub fn classified(classifier: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            classifier: Some(classifier.into()),
            extension: extension.into(),
        }
    }

    /// File name for this artifact: `{module}-{version}[-{classifier}].{extension}`.
    pub fn file_name(&self, module: &str, version: &str) -> String {
        match &self.classifier {
            Some(classifier) => format!("{module}-{version}-{classifier}.{}", self.extension),
            None => format!("{module}-{version}.{}", self.extension),
        }
    }

    /// Stable key used to address this artifact in sources and reports.
    pub fn key(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{classifier}.{}", self.extension),
            None => self.extension.clone(),
        }
    }
}

/// A secondary, minimal publication registering a discoverable identity
/// (e.g. a plugin id) distinct from the module's implementation coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerPublication {
    /// Group of the marker publication (the plugin id itself).
    pub group: String,

    /// Module name of the marker publication.
    pub module: String,
}

impl MarkerPublication {
    /// Build marker coordinates for a plugin id the conventional way:
    /// group = plugin id, module = `{plugin-id}.gradle.plugin`.
    pub fn for_plugin_id(plugin_id: &str) -> Self {
        Self {
            group: plugin_id.to_string(),
            module: format!("{plugin_id}{MARKER_MODULE_SUFFIX}"),
        }
    }

    /// `group:module` coordinates of the marker.
    pub fn coordinates(&self) -> String {
        format!("{}:{}", self.group, self.module)
    }
}

/// Identifies one publishable unit of a multi-module build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Group identifier (`com.acme.tools`).
    pub group: String,

    /// Module identifier (`acme-gradle-plugin`).
    pub module: String,

    /// Resolved version, if known at plan time. A `Final` release plan
    /// requires this to be present.
    pub version: Option<String>,

    /// Ordered list of classified artifacts to publish.
    pub artifacts: Vec<ArtifactSpec>,

    /// Optional marker publication, published as an independent unit.
    pub marker: Option<MarkerPublication>,
}

impl ModuleDescriptor {
    pub fn new(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
            version: None,
            artifacts: Vec::new(),
            marker: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactSpec) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Register a marker publication for the given plugin id.
    pub fn with_plugin_marker(mut self, plugin_id: &str) -> Self {
        self.marker = Some(MarkerPublication::for_plugin_id(plugin_id));
        self
    }

    /// `group:module` coordinates, the stable module identifier used for
    /// deterministic result ordering and reporting.
    pub fn coordinates(&self) -> String {
        format!("{}:{}", self.group, self.module)
    }

    /// Whether this module publishes anything at all (artifacts or marker).
    pub fn has_publications(&self) -> bool {
        !self.artifacts.is_empty() || self.marker.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_names() {
        let primary = ArtifactSpec::new("jar");
        assert_eq!(primary.file_name("lib", "1.2.3"), "lib-1.2.3.jar");

        let sources = ArtifactSpec::classified("sources", "jar");
        assert_eq!(sources.file_name("lib", "1.2.3"), "lib-1.2.3-sources.jar");
        assert_eq!(sources.key(), "sources.jar");
    }

    #[test]
    fn test_marker_coordinates_follow_plugin_id_convention() {
        let marker = MarkerPublication::for_plugin_id("com.acme.example");
        assert_eq!(marker.group, "com.acme.example");
        assert_eq!(marker.module, "com.acme.example.gradle.plugin");
        assert_eq!(
            marker.coordinates(),
            "com.acme.example:com.acme.example.gradle.plugin"
        );
    }

    #[test]
    fn test_module_with_zero_artifacts_and_marker_still_publishes() {
        let module = ModuleDescriptor::new("com.acme", "acme-plugin")
            .with_plugin_marker("com.acme.example");
        assert!(module.artifacts.is_empty());
        assert!(module.has_publications());
    }
}
