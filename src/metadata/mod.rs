// src/metadata/mod.rs

//! Repository metadata data structures
//!
//! In-memory representation of the repodata universe: packages with their
//! capability entries, the repomd index, and metalink mirror descriptions.
//! Packages reference their repository through a stable index into the
//! repository table, which outlives every package.

use crate::version::{ranges_overlap, EntryFlags, RpmVersion};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Index into the resolved repository table
pub type RepoId = usize;

/// A capability reference, as carried by requires/provides/conflicts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub flags: Option<EntryFlags>,
    pub epoch: Option<u64>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl Entry {
    /// Unversioned capability
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: None,
            epoch: None,
            version: None,
            release: None,
        }
    }

    /// The entry's version bound, when it carries one
    ///
    /// A missing epoch equals 0.
    pub fn bound(&self) -> Option<RpmVersion> {
        self.version.as_ref().map(|v| RpmVersion {
            epoch: self.epoch.unwrap_or(0),
            version: v.clone(),
            release: self.release.clone(),
        })
    }

    /// Does this provides entry satisfy the given requires entry?
    ///
    /// Names must already match. When either side carries no version the
    /// pair overlaps; otherwise the canonical range comparison decides.
    pub fn satisfies(&self, req: &Entry) -> bool {
        debug_assert_eq!(self.name, req.name);
        let (a, b) = match (self.bound(), req.bound()) {
            (Some(a), Some(b)) => (a, b),
            _ => return true,
        };
        let a_flags = self.flags.unwrap_or(EntryFlags::Eq);
        let b_flags = req.flags.unwrap_or(EntryFlags::Eq);
        ranges_overlap(a_flags, &a, b_flags, &b)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(flags), Some(bound)) = (self.flags, self.bound()) {
            write!(f, " {} {}", flags, bound)?;
        }
        Ok(())
    }
}

/// Checksum carried verbatim from the repository metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Digest algorithm as declared by the repository (e.g. "sha256")
    pub algorithm: String,
    /// Hex digest
    pub hex: String,
}

/// A single package from a repository's primary metadata
///
/// Identity is the NEVRA tuple (name, epoch, version, release, arch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub arch: String,
    pub version: RpmVersion,
    pub checksum: Checksum,
    pub location_href: String,
    /// Back-pointer into the repository table
    pub repository: RepoId,
    pub requires: Vec<Entry>,
    pub provides: Vec<Entry>,
    pub conflicts: Vec<Entry>,
    /// File paths listed in primary metadata; each is an implicit provides
    pub files: Vec<String>,
}

impl Package {
    /// Deterministic NEVRA ordering: name, then epoch/version/release, then arch
    pub fn compare_nevra(&self, other: &Package) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.arch.cmp(&other.arch))
    }

    /// Variable ordering for the solver: name ascending, version descending
    /// (newest first), arch ascending
    pub fn compare_preference(&self, other: &Package) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| other.version.cmp(&self.version))
            .then_with(|| self.arch.cmp(&other.arch))
    }
}

impl fmt::Display for Package {
    /// Printable NEVRA form: `name-[epoch:]version-release.arch`
    ///
    /// The epoch is printed only when non-zero; user-facing prefix matching
    /// and ignore regexes both run against this form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.arch)
    }
}

/// File type constants used in repomd.xml
pub const PRIMARY_FILE_TYPE: &str = "primary";
pub const FILELISTS_FILE_TYPE: &str = "filelists";

/// One `<data>` element of repomd.xml
#[derive(Debug, Clone)]
pub struct RepomdData {
    pub file_type: String,
    pub location_href: String,
}

/// Parsed repomd.xml index
#[derive(Debug, Clone, Default)]
pub struct Repomd {
    pub data: Vec<RepomdData>,
}

impl Repomd {
    /// Find the payload of a given type (e.g. "primary")
    pub fn file(&self, file_type: &str) -> Option<&RepomdData> {
        self.data.iter().find(|d| d.file_type == file_type)
    }
}

/// One `<url>` resource of a metalink file
#[derive(Debug, Clone)]
pub struct MetalinkUrl {
    pub protocol: String,
    pub text: String,
}

/// Parsed metalink for repomd.xml
#[derive(Debug, Clone, Default)]
pub struct Metalink {
    pub urls: Vec<MetalinkUrl>,
}

impl Metalink {
    /// Up to `limit` https mirror base URLs, with the trailing
    /// `repodata/repomd.xml` stripped
    pub fn https_mirrors(&self, limit: usize) -> Vec<String> {
        let mut out = Vec::new();
        for url in &self.urls {
            if url.protocol != "https" {
                continue;
            }
            let base = url
                .text
                .strip_suffix("repodata/repomd.xml")
                .unwrap_or(&url.text);
            out.push(base.to_string());
            if out.len() == limit {
                break;
            }
        }
        out
    }
}

/// A package entry from filelists.xml with its full file listing
#[derive(Debug, Clone)]
pub struct FileListPackage {
    pub name: String,
    pub arch: String,
    pub version: RpmVersion,
    pub files: Vec<String>,
}

impl fmt::Display for FileListPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.arch)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::version::EntryFlags;

    pub(crate) fn make_package(name: &str, evr: &str, arch: &str) -> Package {
        Package {
            name: name.to_string(),
            arch: arch.to_string(),
            version: RpmVersion::parse(evr),
            checksum: Checksum {
                algorithm: "sha256".to_string(),
                hex: format!("{:064}", 0),
            },
            location_href: format!("Packages/{}.rpm", name),
            repository: 0,
            requires: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_package_display_without_epoch() {
        let pkg = make_package("bash", "5.2.15-3.fc38", "x86_64");
        assert_eq!(pkg.to_string(), "bash-5.2.15-3.fc38.x86_64");
    }

    #[test]
    fn test_package_display_with_epoch() {
        let pkg = make_package("openssl", "1:3.0.8-1.fc38", "x86_64");
        assert_eq!(pkg.to_string(), "openssl-1:3.0.8-1.fc38.x86_64");
    }

    #[test]
    fn test_preference_order_newest_first() {
        let old = make_package("bash", "5.1.0-1", "x86_64");
        let new = make_package("bash", "5.2.15-1", "x86_64");
        assert_eq!(new.compare_preference(&old), Ordering::Less);
        assert_eq!(new.compare_nevra(&old), Ordering::Greater);
    }

    #[test]
    fn test_entry_satisfies_unversioned() {
        let provides = Entry::named("libfoo.so.1()(64bit)");
        let requires = Entry::named("libfoo.so.1()(64bit)");
        assert!(provides.satisfies(&requires));
    }

    #[test]
    fn test_entry_satisfies_versioned() {
        let provides = Entry {
            name: "bash".to_string(),
            flags: Some(EntryFlags::Eq),
            epoch: Some(0),
            version: Some("5.2.15".to_string()),
            release: Some("3.fc38".to_string()),
        };
        let ok = Entry {
            name: "bash".to_string(),
            flags: Some(EntryFlags::Ge),
            epoch: None,
            version: Some("5.0".to_string()),
            release: None,
        };
        let too_new = Entry {
            name: "bash".to_string(),
            flags: Some(EntryFlags::Ge),
            epoch: None,
            version: Some("6.0".to_string()),
            release: None,
        };
        assert!(provides.satisfies(&ok));
        assert!(!provides.satisfies(&too_new));
    }

    #[test]
    fn test_metalink_mirror_extraction() {
        let metalink = Metalink {
            urls: vec![
                MetalinkUrl {
                    protocol: "http".to_string(),
                    text: "http://a.example/fedora/repodata/repomd.xml".to_string(),
                },
                MetalinkUrl {
                    protocol: "https".to_string(),
                    text: "https://b.example/fedora/repodata/repomd.xml".to_string(),
                },
                MetalinkUrl {
                    protocol: "https".to_string(),
                    text: "https://c.example/fedora/repodata/repomd.xml".to_string(),
                },
            ],
        };
        let mirrors = metalink.https_mirrors(4);
        assert_eq!(
            mirrors,
            vec!["https://b.example/fedora/", "https://c.example/fedora/"]
        );
    }

    #[test]
    fn test_repomd_file_lookup() {
        let repomd = Repomd {
            data: vec![RepomdData {
                file_type: "primary".to_string(),
                location_href: "repodata/abc-primary.xml.gz".to_string(),
            }],
        };
        assert!(repomd.file(PRIMARY_FILE_TYPE).is_some());
        assert!(repomd.file(FILELISTS_FILE_TYPE).is_none());
    }
}
