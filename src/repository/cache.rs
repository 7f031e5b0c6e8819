// src/repository/cache.rs

//! Cached metadata access
//!
//! The cache directory holds one subdirectory per repository:
//! `<cache-dir>/<repo-name>/repomd.xml` plus the payload files named by the
//! repomd index (e.g. `<hash>-primary.xml.gz`) and an optional `metalink`.
//! The cache is read-only to the resolver; a missing or corrupt file is a
//! fatal load error, never a silently empty universe.

use crate::cancel::CancelToken;
use crate::compression;
use crate::error::{Error, Result};
use crate::metadata::{
    FileListPackage, Metalink, MetalinkUrl, Package, RepoId, Repomd, RepomdData,
    FILELISTS_FILE_TYPE, PRIMARY_FILE_TYPE,
};
use crate::repository::{filelists, primary, Repository};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info};

/// Reads repository metadata out of the local cache layout
#[derive(Debug, Clone)]
pub struct CacheHelper {
    cache_dir: PathBuf,
}

impl CacheHelper {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        info!("Using cache directory {}", cache_dir.display());
        Self { cache_dir }
    }

    fn repo_file(&self, repo: &Repository, name: &str) -> PathBuf {
        self.cache_dir.join(&repo.name).join(name)
    }

    fn open_repo_file(&self, repo: &Repository, name: &str) -> Result<std::fs::File> {
        let path = self.repo_file(repo, name);
        debug!("opening {}", path.display());
        std::fs::File::open(&path).map_err(|e| Error::Cache {
            repository: repo.name.clone(),
            reason: format!("failed to open {}: {}", path.display(), e),
        })
    }

    /// Parse `<repo>/repomd.xml`
    pub fn load_repomd(&self, repo: &Repository) -> Result<Repomd> {
        let file = self.open_repo_file(repo, "repomd.xml")?;
        parse_repomd(BufReader::new(file), &format!("{}/repomd.xml", repo.name))
    }

    /// Parse `<repo>/metalink`
    pub fn load_metalink(&self, repo: &Repository) -> Result<Metalink> {
        let file = self.open_repo_file(repo, "metalink")?;
        parse_metalink(BufReader::new(file), &format!("{}/metalink", repo.name))
    }

    /// Resolve the mirror list for a repository
    ///
    /// Explicit mirrors win; otherwise up to four https mirrors come from a
    /// cached metalink; otherwise `baseurl` is the single mirror.
    pub fn resolve_mirrors(&self, repo: &Repository) -> Result<Vec<String>> {
        if !repo.mirrors.is_empty() {
            return Ok(repo.mirrors.clone());
        }
        if repo.metalink.is_some() {
            let path = self.repo_file(repo, "metalink");
            if path.exists() {
                debug!("extracting mirrors from metalink for {}", repo.name);
                let metalink = self.load_metalink(repo)?;
                let mirrors = metalink.https_mirrors(4);
                if !mirrors.is_empty() {
                    return Ok(mirrors);
                }
            }
        }
        match &repo.baseurl {
            Some(baseurl) => Ok(vec![baseurl.clone()]),
            None => Err(Error::Cache {
                repository: repo.name.clone(),
                reason: "no mirrors available: metalink absent and no baseurl configured"
                    .to_string(),
            }),
        }
    }

    /// Decode the primary metadata of one repository into packages
    ///
    /// Every returned package carries `repo_id` as its repository
    /// back-pointer. Only `noarch` and `arch` packages are kept.
    pub fn current_primary(
        &self,
        repo: &Repository,
        repo_id: RepoId,
        arch: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Package>> {
        let repomd = self.load_repomd(repo)?;
        let primary_data = repomd.file(PRIMARY_FILE_TYPE).ok_or_else(|| Error::Cache {
            repository: repo.name.clone(),
            reason: "repomd.xml lists no primary payload".to_string(),
        })?;
        let primary_name = href_basename(&primary_data.location_href);
        let path = self.repo_file(repo, primary_name);

        let reader = compression::open_decoded(&path)?;
        let arches = ["noarch", arch];
        let packages = primary::parse_primary(
            BufReader::new(reader),
            repo_id,
            &arches,
            &format!("{}/{}", repo.name, primary_name),
            cancel,
        )?;
        debug!(
            repository = %repo.name,
            count = packages.len(),
            "primary metadata decoded"
        );
        Ok(packages)
    }

    /// Stream the filelists of one repository for the given targets
    ///
    /// Targets not present in this repository are returned as remaining.
    pub fn filelists_for_packages(
        &self,
        repo: &Repository,
        arches: &[&str],
        targets: &[Package],
    ) -> Result<(Vec<FileListPackage>, Vec<Package>)> {
        let repomd = self.load_repomd(repo)?;
        let filelists_data = repomd
            .file(FILELISTS_FILE_TYPE)
            .ok_or_else(|| Error::Cache {
                repository: repo.name.clone(),
                reason: "repomd.xml lists no filelists payload".to_string(),
            })?;
        let filelists_name = href_basename(&filelists_data.location_href);
        let path = self.repo_file(repo, filelists_name);

        let reader = compression::open_decoded(&path)?;
        filelists::filelists_for_packages(
            BufReader::new(reader),
            arches,
            targets,
            &format!("{}/{}", repo.name, filelists_name),
        )
    }
}

fn href_basename(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}

/// Parse a repomd.xml index
pub fn parse_repomd<R: BufRead>(reader: R, source: &str) -> Result<Repomd> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut repomd = Repomd::default();
    let mut current_type: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf).map_err(|e| decode_err(source, e))? {
            Event::Start(ref e) if e.local_name().as_ref() == b"data" => {
                current_type = attr(e, b"type", source)?;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"location" => {
                if let (Some(file_type), Some(href)) =
                    (current_type.clone(), attr(e, b"href", source)?)
                {
                    repomd.data.push(RepomdData {
                        file_type,
                        location_href: href,
                    });
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"data" => current_type = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(repomd)
}

/// Parse a metalink file, collecting the repomd.xml resource URLs
pub fn parse_metalink<R: BufRead>(reader: R, source: &str) -> Result<Metalink> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut metalink = Metalink::default();
    let mut in_repomd_file = false;
    let mut current_protocol = String::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf).map_err(|e| decode_err(source, e))? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"file" => {
                    in_repomd_file = attr(e, b"name", source)?.as_deref() == Some("repomd.xml");
                }
                b"url" if in_repomd_file => {
                    // mirrors declare both `protocol` and `type`; accept either
                    current_protocol = attr(e, b"protocol", source)?
                        .or(attr(e, b"type", source)?)
                        .unwrap_or_default();
                    text.clear();
                }
                _ => {}
            },
            Event::Text(t) => text.push_str(&t.unescape().map_err(|e| decode_err(source, e))?),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"url" if in_repomd_file => {
                    metalink.urls.push(MetalinkUrl {
                        protocol: std::mem::take(&mut current_protocol),
                        text: std::mem::take(&mut text),
                    });
                }
                b"file" => in_repomd_file = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(metalink)
}

fn attr(
    e: &quick_xml::events::BytesStart<'_>,
    key: &[u8],
    source: &str,
) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|err| Error::MetadataDecode {
                file: source.to_string(),
                reason: err.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn decode_err(source: &str, e: quick_xml::Error) -> Error {
    Error::MetadataDecode {
        file: source.to_string(),
        reason: e.to_string(),
    }
}

/// Load the primaries of every repository matching the target arch
///
/// Repositories declared for a different architecture are skipped with a
/// log line, mirroring the configured-but-inapplicable case.
pub fn load_primaries(
    helper: &CacheHelper,
    repos: &[Repository],
    arch: &str,
    cancel: &CancelToken,
) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    for (repo_id, repo) in repos.iter().enumerate() {
        if repo.arch != arch && repo.arch != "noarch" {
            info!("Ignoring primary for {} - {}", repo.name, repo.arch);
            continue;
        }
        debug!("loading primary for {}", repo.name);
        packages.extend(helper.current_primary(repo, repo_id, arch, cancel)?);
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>1687000000</revision>
  <data type="primary">
    <checksum type="sha256">abc</checksum>
    <location href="repodata/abc-primary.xml.gz"/>
  </data>
  <data type="filelists">
    <checksum type="sha256">def</checksum>
    <location href="repodata/def-filelists.xml.gz"/>
  </data>
</repomd>
"#;

    const METALINK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<metalink xmlns="http://www.metalinker.org/">
  <files>
    <file name="repomd.xml">
      <resources>
        <url protocol="http" type="http">http://a.example/fedora/repodata/repomd.xml</url>
        <url protocol="https" type="https">https://b.example/fedora/repodata/repomd.xml</url>
        <url protocol="https" type="https">https://c.example/fedora/repodata/repomd.xml</url>
        <url protocol="rsync" type="rsync">rsync://d.example/fedora/repodata/repomd.xml</url>
      </resources>
    </file>
  </files>
</metalink>
"#;

    #[test]
    fn test_parse_repomd() {
        let repomd = parse_repomd(Cursor::new(REPOMD), "repomd.xml").unwrap();
        assert_eq!(repomd.data.len(), 2);
        assert_eq!(
            repomd.file(PRIMARY_FILE_TYPE).map(|d| d.location_href.as_str()),
            Some("repodata/abc-primary.xml.gz")
        );
        assert_eq!(
            repomd
                .file(FILELISTS_FILE_TYPE)
                .map(|d| d.location_href.as_str()),
            Some("repodata/def-filelists.xml.gz")
        );
    }

    #[test]
    fn test_parse_metalink_https_only() {
        let metalink = parse_metalink(Cursor::new(METALINK), "metalink").unwrap();
        let mirrors = metalink.https_mirrors(4);
        assert_eq!(
            mirrors,
            vec!["https://b.example/fedora/", "https://c.example/fedora/"]
        );
    }

    #[test]
    fn test_href_basename() {
        assert_eq!(href_basename("repodata/abc-primary.xml.gz"), "abc-primary.xml.gz");
        assert_eq!(href_basename("plain.xml"), "plain.xml");
    }
}
