// src/repository/mod.rs

//! Repository descriptors and repo-list files
//!
//! A repo-list file is a YAML mapping with a `repositories` sequence.
//! Several files can be merged; a later entry replaces an earlier one with
//! the same name. Descriptors live for the whole process; packages refer to
//! them through indices into the loaded table.

mod cache;
mod filelists;
mod primary;

pub use cache::{load_primaries, parse_metalink, parse_repomd, CacheHelper};
pub use filelists::filelists_for_packages;
pub use primary::parse_primary;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// A single repository descriptor from a repo-list file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub arch: String,
    /// Lower value wins when two repositories carry the same package
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metalink: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
}

/// The merged repository table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repositories {
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Repositories {
    /// Load and merge one or more repo-list files
    ///
    /// Later files override earlier entries by `name`; order of first
    /// appearance is preserved.
    pub fn load(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut merged = Repositories::default();
        for path in paths {
            let path = path.as_ref();
            let file = File::open(path).map_err(|e| {
                Error::Config(format!("cannot open repo file {}: {}", path.display(), e))
            })?;
            let repos: Repositories = serde_yaml::from_reader(file).map_err(|e| {
                Error::Config(format!("malformed repo file {}: {}", path.display(), e))
            })?;
            for repo in repos.repositories {
                merged.upsert(repo);
            }
        }
        merged.validate()?;
        Ok(merged)
    }

    fn upsert(&mut self, repo: Repository) {
        match self.repositories.iter_mut().find(|r| r.name == repo.name) {
            Some(existing) => *existing = repo,
            None => self.repositories.push(repo),
        }
    }

    fn validate(&self) -> Result<()> {
        for repo in &self.repositories {
            if repo.name.is_empty() {
                return Err(Error::Config("repository with empty name".to_string()));
            }
            if repo.mirrors.is_empty() && repo.metalink.is_none() && repo.baseurl.is_none() {
                return Err(Error::Config(format!(
                    "repository '{}' has no mirrors, no metalink and no baseurl",
                    repo.name
                )));
            }
        }
        Ok(())
    }
}
