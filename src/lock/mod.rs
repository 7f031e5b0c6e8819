// src/lock/mod.rs

//! Deterministic lock document
//!
//! The lock file pins the resolved install set: exact artifacts (checksum +
//! relative href + repository), the mirror lists to fetch them from, and a
//! name-level dependency graph that is guaranteed acyclic. Identical inputs
//! serialize to byte-identical output.

use crate::error::{Error, Result};
use crate::metadata::Package;
use crate::repository::Repository;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One resolved package in the lock document
///
/// Field order is the serialized key order (alphabetical).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    /// Sorted name-level dependencies; never contains the package itself
    pub dependencies: Vec<String>,
    /// Relative location inside the repository
    pub href: String,
    pub name: String,
    /// Name of the repository the package was taken from
    pub repository: String,
    pub sha256: String,
}

/// The lock document root
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockFile {
    /// Original argv tail, recorded for auditability
    #[serde(rename = "cli-arguments")]
    pub cli_arguments: Vec<String>,
    /// Repository name → mirror base URLs
    pub repositories: BTreeMap<String, Vec<String>>,
    /// Sorted by package name
    pub packages: Vec<LockedPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    /// Full NEVRAs of force-ignored packages, sorted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

impl LockFile {
    /// Serialize with TAB indentation and a trailing newline
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Write the document atomically: temp file in the target directory,
    /// then rename. A failure never leaves a partial lock file behind.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let bytes = self.to_json_bytes()?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        info!(path = %path.display(), "lock file written");
        Ok(())
    }
}

/// Assemble the lock document from a finished resolution
///
/// `roots` drive the cycle-breaking DFS in their input order; `targets`
/// are recorded verbatim (sorted) for the consumer.
pub fn build_lockfile(
    repositories: &[Repository],
    mirrors: &[Vec<String>],
    install: &[Package],
    force_ignored: &[Package],
    roots: &[String],
    targets: &[String],
    cli_arguments: &[String],
) -> Result<LockFile> {
    let providers = provider_map(install, force_ignored);

    let ignored_names: HashSet<&str> = force_ignored.iter().map(|p| p.name.as_str()).collect();
    let ignored_caps = ignored_capabilities(force_ignored);

    // name-level dependency lists, before cycle breaking
    let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pkg in install {
        let mut deps = BTreeSet::new();
        for req in &pkg.requires {
            match providers.get(req.name.as_str()) {
                Some(provider) => {
                    if *provider == pkg.name || ignored_names.contains(provider.as_str()) {
                        continue;
                    }
                    deps.insert(provider.clone());
                }
                None => {
                    if ignored_caps.contains(req.name.as_str()) {
                        continue;
                    }
                    return Err(Error::MissingProvider {
                        requirement: req.to_string(),
                        package: pkg.to_string(),
                    });
                }
            }
        }
        graph.insert(pkg.name.clone(), deps.into_iter().collect());
    }

    break_cycles(&mut graph, roots);

    let mut packages: Vec<LockedPackage> = install
        .iter()
        .map(|pkg| LockedPackage {
            dependencies: graph.remove(&pkg.name).unwrap_or_default(),
            href: pkg.location_href.clone(),
            name: pkg.name.clone(),
            repository: repositories[pkg.repository].name.clone(),
            sha256: pkg.checksum.hex.clone(),
        })
        .collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    let mut repo_mirrors = BTreeMap::new();
    for (repo, mirrors) in repositories.iter().zip(mirrors) {
        repo_mirrors.insert(repo.name.clone(), mirrors.clone());
    }

    let mut targets: Vec<String> = targets.to_vec();
    targets.sort();

    let mut ignored: Vec<String> = force_ignored.iter().map(|p| p.to_string()).collect();
    ignored.sort();

    Ok(LockFile {
        cli_arguments: cli_arguments.to_vec(),
        repositories: repo_mirrors,
        packages,
        targets,
        ignored,
    })
}

/// Capability name → providing package name
///
/// Force-ignored packages are entered first so an installed provider always
/// overrides an ignored one.
fn provider_map(install: &[Package], force_ignored: &[Package]) -> HashMap<String, String> {
    let mut providers = HashMap::new();
    for pkg in force_ignored.iter().chain(install.iter()) {
        providers.insert(pkg.name.clone(), pkg.name.clone());
        for prov in &pkg.provides {
            providers.insert(prov.name.clone(), pkg.name.clone());
        }
        for file in &pkg.files {
            providers.insert(file.clone(), pkg.name.clone());
        }
    }
    providers
}

fn ignored_capabilities(force_ignored: &[Package]) -> HashSet<String> {
    let mut caps = HashSet::new();
    for pkg in force_ignored {
        caps.insert(pkg.name.clone());
        for prov in &pkg.provides {
            caps.insert(prov.name.clone());
        }
        for file in &pkg.files {
            caps.insert(file.clone());
        }
    }
    caps
}

/// Drop edges until the dependency graph is a DAG
///
/// DFS starts at each root in input order, then at any still-unvisited node
/// in name order. An edge into a node on the current DFS stack closes a
/// cycle and is dropped; an edge into a finished node is kept but not
/// re-traversed (a finished node cannot lead back into the stack).
fn break_cycles(graph: &mut BTreeMap<String, Vec<String>>, roots: &[String]) {
    let mut visited: HashSet<String> = HashSet::new();

    let mut order: Vec<String> = roots.to_vec();
    order.extend(graph.keys().cloned());

    for start in order {
        if visited.contains(&start) || !graph.contains_key(&start) {
            continue;
        }
        dfs(graph, &mut visited, start);
    }
}

fn dfs(graph: &mut BTreeMap<String, Vec<String>>, visited: &mut HashSet<String>, start: String) {
    let mut on_stack: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, usize)> = Vec::new();

    on_stack.insert(start.clone());
    stack.push((start, 0));

    loop {
        let (node, idx) = match stack.last() {
            Some((n, i)) => (n.clone(), *i),
            None => break,
        };

        let target = graph.get(&node).and_then(|edges| edges.get(idx).cloned());
        let target = match target {
            Some(t) => t,
            None => {
                visited.insert(node.clone());
                on_stack.remove(&node);
                stack.pop();
                continue;
            }
        };

        if on_stack.contains(&target) {
            debug!(from = %node, to = %target, "breaking dependency cycle");
            if let Some(edges) = graph.get_mut(&node) {
                edges.remove(idx);
            }
            // the next edge slid into this index; do not advance
            continue;
        }

        if let Some((_, i)) = stack.last_mut() {
            *i += 1;
        }
        if visited.contains(&target) || !graph.contains_key(&target) {
            continue;
        }
        on_stack.insert(target.clone());
        stack.push((target, 0));
    }
}
