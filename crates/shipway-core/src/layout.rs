//! Target repository layout: paths, checksum side-files, version index.
//!
//! Artifacts are addressed as
//! `{repo}/{group/as/path}/{module}/{version}/{module}-{version}[-{classifier}].{ext}`.
//! Every uploaded file carries `.md5`, `.sha1`, `.sha256` and `.sha512`
//! side-files; signed files additionally carry a `.asc` detached signature
//! which is itself checksummed. The per-module version index
//! (`maven-metadata.xml`) lists all published versions plus the
//! latest/release pointers.

use chrono::Utc;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::domain::{ReleaseError, Result};

/// File name of the per-module version index.
pub const VERSION_INDEX_FILE: &str = "maven-metadata.xml";

/// Checksum side-file extensions, in publication order.
pub const CHECKSUM_EXTENSIONS: [&str; 4] = ["md5", "sha1", "sha256", "sha512"];

/// Detached signature side-file extension.
pub const SIGNATURE_EXTENSION: &str = "asc";

/// Hex checksum of `bytes` for one of [`CHECKSUM_EXTENSIONS`].
pub fn checksum(extension: &str, bytes: &[u8]) -> Result<String> {
    let digest = match extension {
        "md5" => hex::encode(Md5::digest(bytes)),
        "sha1" => hex::encode(Sha1::digest(bytes)),
        "sha256" => hex::encode(Sha256::digest(bytes)),
        "sha512" => hex::encode(Sha512::digest(bytes)),
        other => {
            return Err(ReleaseError::Protocol(format!(
                "unsupported checksum extension: {other}"
            )))
        }
    };
    Ok(digest)
}

/// Path helpers for one target repository root (e.g. `releases` or
/// `staging/deployByRepositoryId/abc-1001`).
#[derive(Debug, Clone)]
pub struct RepositoryLayout {
    repository: String,
}

impl RepositoryLayout {
    pub fn new(repository: impl Into<String>) -> Self {
        let repository = repository.into();
        Self {
            repository: repository.trim_matches('/').to_string(),
        }
    }

    /// `{repo}/{group/as/path}/{module}` — the directory holding all
    /// versions of a module plus its version index.
    pub fn module_dir(&self, group: &str, module: &str) -> String {
        format!("{}/{}/{}", self.repository, group.replace('.', "/"), module)
    }

    /// Directory of one version of a module.
    pub fn version_dir(&self, group: &str, module: &str, version: &str) -> String {
        format!("{}/{}", self.module_dir(group, module), version)
    }

    /// Full path of one file within a module version directory.
    pub fn file_path(&self, group: &str, module: &str, version: &str, file_name: &str) -> String {
        format!("{}/{}", self.version_dir(group, module, version), file_name)
    }

    /// Path of the module's version index.
    pub fn version_index_path(&self, group: &str, module: &str) -> String {
        format!("{}/{VERSION_INDEX_FILE}", self.module_dir(group, module))
    }
}

/// The per-module version index: all published versions plus the
/// latest/release pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIndex {
    pub group: String,
    pub module: String,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
}

impl VersionIndex {
    /// Empty index for a module that has never been published.
    pub fn empty(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
            latest: None,
            release: None,
            versions: Vec::new(),
        }
    }

    /// Parse an existing index document. Tolerates unknown elements; only
    /// the versioning block is read back.
    pub fn parse(group: &str, module: &str, xml: &str) -> Result<Self> {
        let version_re = regex::Regex::new(r"<version>([^<]+)</version>")
            .expect("static regex");
        let latest_re = regex::Regex::new(r"<latest>([^<]+)</latest>").expect("static regex");
        let release_re = regex::Regex::new(r"<release>([^<]+)</release>").expect("static regex");

        let versions: Vec<String> = version_re
            .captures_iter(xml)
            .map(|c| c[1].trim().to_string())
            .collect();
        if versions.is_empty() && !xml.contains("<versioning>") {
            return Err(ReleaseError::Protocol(format!(
                "version index for {group}:{module} has no versioning block"
            )));
        }

        Ok(Self {
            group: group.to_string(),
            module: module.to_string(),
            latest: latest_re.captures(xml).map(|c| c[1].trim().to_string()),
            release: release_re.captures(xml).map(|c| c[1].trim().to_string()),
            versions,
        })
    }

    /// Record a newly published version, updating the latest pointer and,
    /// for releases, the release pointer. Re-adding a known version keeps
    /// the list deduplicated.
    pub fn add_version(&mut self, version: &str, is_release: bool) {
        if !self.versions.iter().any(|v| v == version) {
            self.versions.push(version.to_string());
        }
        self.latest = Some(version.to_string());
        if is_release {
            self.release = Some(version.to_string());
        }
    }

    /// Render the index document.
    pub fn to_xml(&self) -> String {
        let mut versions = String::new();
        for version in &self.versions {
            versions.push_str(&format!("      <version>{version}</version>\n"));
        }
        let latest = self
            .latest
            .as_deref()
            .map(|v| format!("    <latest>{v}</latest>\n"))
            .unwrap_or_default();
        let release = self
            .release
            .as_deref()
            .map(|v| format!("    <release>{v}</release>\n"))
            .unwrap_or_default();
        let last_updated = Utc::now().format("%Y%m%d%H%M%S");

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <metadata>\n\
             \x20 <groupId>{}</groupId>\n\
             \x20 <artifactId>{}</artifactId>\n\
             \x20 <versioning>\n\
             {latest}{release}\
             \x20   <versions>\n\
             {versions}\
             \x20   </versions>\n\
             \x20   <lastUpdated>{last_updated}</lastUpdated>\n\
             \x20 </versioning>\n\
             </metadata>\n",
            self.group, self.module
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_extensions_all_supported() {
        for ext in CHECKSUM_EXTENSIONS {
            let digest = checksum(ext, b"payload").unwrap();
            assert!(!digest.is_empty());
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert!(checksum("crc32", b"payload").is_err());
    }

    #[test]
    fn test_checksum_lengths_match_algorithms() {
        assert_eq!(checksum("md5", b"x").unwrap().len(), 32);
        assert_eq!(checksum("sha1", b"x").unwrap().len(), 40);
        assert_eq!(checksum("sha256", b"x").unwrap().len(), 64);
        assert_eq!(checksum("sha512", b"x").unwrap().len(), 128);
    }

    #[test]
    fn test_layout_paths() {
        let layout = RepositoryLayout::new("releases");
        assert_eq!(
            layout.file_path("com.acme.tools", "lib", "1.2.3", "lib-1.2.3.jar"),
            "releases/com/acme/tools/lib/1.2.3/lib-1.2.3.jar"
        );
        assert_eq!(
            layout.version_index_path("com.acme.tools", "lib"),
            "releases/com/acme/tools/lib/maven-metadata.xml"
        );
    }

    #[test]
    fn test_layout_trims_slashes() {
        let layout = RepositoryLayout::new("/staging/deployByRepositoryId/r-1/");
        assert_eq!(
            layout.module_dir("com.acme", "lib"),
            "staging/deployByRepositoryId/r-1/com/acme/lib"
        );
    }

    #[test]
    fn test_version_index_round_trip() {
        let mut index = VersionIndex::empty("com.acme", "lib");
        index.add_version("0.9.0", true);
        index.add_version("1.0.0", true);

        let xml = index.to_xml();
        let parsed = VersionIndex::parse("com.acme", "lib", &xml).unwrap();
        assert_eq!(parsed.versions, vec!["0.9.0", "1.0.0"]);
        assert_eq!(parsed.latest.as_deref(), Some("1.0.0"));
        assert_eq!(parsed.release.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_add_version_deduplicates_and_moves_pointers() {
        let mut index = VersionIndex::empty("com.acme", "lib");
        index.add_version("1.0.0", true);
        index.add_version("1.1.0-rc.1", false);
        index.add_version("1.0.0", true);

        assert_eq!(index.versions, vec!["1.0.0", "1.1.0-rc.1"]);
        assert_eq!(index.latest.as_deref(), Some("1.0.0"));
        assert_eq!(index.release.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(VersionIndex::parse("g", "m", "<html>not metadata</html>").is_err());
    }
}
