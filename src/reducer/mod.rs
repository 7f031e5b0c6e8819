// src/reducer/mod.rs

//! Universe reduction
//!
//! A Fedora-class universe holds tens of thousands of packages; only a small
//! closure around the required names can ever appear in a solution. The
//! reducer matches required names against the universe, then grows the set
//! under `requires` until a fixed point, and finally prunes provides entries
//! nobody references. The result is the involved set the solver encodes.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::metadata::Package;
use crate::repository::{load_primaries, CacheHelper, Repository};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// The flat package universe with its capability index
pub struct PackageInfo {
    pub packages: Vec<Package>,
    /// capability name → indices of providing packages (provides and files)
    provides: HashMap<String, Vec<usize>>,
}

impl PackageInfo {
    /// Build the index over an already assembled package list
    pub fn new(packages: Vec<Package>) -> Self {
        let mut provides: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, pkg) in packages.iter().enumerate() {
            for prov in &pkg.provides {
                provides.entry(prov.name.clone()).or_default().push(i);
            }
            for file in &pkg.files {
                provides.entry(file.clone()).or_default().push(i);
            }
        }
        Self { packages, provides }
    }
}

/// Reduces the universe to the packages involved in a resolution
pub struct RepoReducer {
    repositories: Vec<Repository>,
    implicit_requires: Vec<String>,
    arch: String,
    cache: CacheHelper,
    package_info: Option<PackageInfo>,
}

impl RepoReducer {
    pub fn new(
        repositories: Vec<Repository>,
        base_system: Option<&str>,
        arch: impl Into<String>,
        cache: CacheHelper,
    ) -> Self {
        let mut implicit_requires = Vec::new();
        if let Some(base) = base_system {
            if !base.is_empty() {
                implicit_requires.push(base.to_string());
            }
        }
        Self {
            repositories,
            implicit_requires,
            arch: arch.into(),
            cache,
            package_info: None,
        }
    }

    /// Decode all applicable repositories into the universe
    ///
    /// Duplicate NEVRAs across repositories keep the copy from the
    /// repository with the lowest priority value. The surviving list is
    /// sorted name-ascending, newest-first so every later scan is
    /// deterministic.
    pub fn load(&mut self, cancel: &CancelToken) -> Result<()> {
        let loaded = load_primaries(&self.cache, &self.repositories, &self.arch, cancel)?;

        let mut by_nevra: BTreeMap<String, Package> = BTreeMap::new();
        for pkg in loaded {
            match by_nevra.entry(pkg.to_string()) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(pkg);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    let existing = self.repositories[slot.get().repository].priority;
                    let candidate = self.repositories[pkg.repository].priority;
                    if existing > candidate {
                        slot.insert(pkg);
                    }
                }
            }
        }

        let mut packages: Vec<Package> = by_nevra.into_values().collect();
        packages.sort_by(|a, b| a.compare_preference(b));

        info!(count = packages.len(), "package universe assembled");
        self.package_info = Some(PackageInfo::new(packages));
        Ok(())
    }

    pub fn package_count(&self) -> usize {
        self.package_info
            .as_ref()
            .map(|info| info.packages.len())
            .unwrap_or(0)
    }

    /// Resolve required names to (matched root names, involved packages)
    ///
    /// Required names may be bare names or (partial) NEVRA prefixes. The
    /// involved set is closed under requires and deterministic.
    pub fn resolve(
        &self,
        required: &[String],
        ignore_missing: bool,
    ) -> Result<(Vec<String>, Vec<Package>)> {
        let info = self.package_info.as_ref().ok_or_else(|| {
            Error::Config("reducer queried before the universe was loaded".to_string())
        })?;

        let mut requests: Vec<&str> = required.iter().map(String::as_str).collect();
        requests.extend(self.implicit_requires.iter().map(String::as_str));

        let mut matched = Vec::new();
        let mut discovered: BTreeMap<String, usize> = BTreeMap::new();

        for req in requests {
            let mut found = false;
            let mut name = "";
            let mut candidates: Vec<usize> = Vec::new();

            for (i, pkg) in info.packages.iter().enumerate() {
                if !pkg.to_string().starts_with(req) || !req.starts_with(&pkg.name) {
                    continue;
                }
                if !found || pkg.name.len() < name.len() {
                    candidates = vec![i];
                    name = &pkg.name;
                    found = true;
                } else if pkg.name == name {
                    candidates.push(i);
                }
            }

            if !found {
                if ignore_missing {
                    debug!(request = req, "no candidate, ignoring missing package");
                    continue;
                }
                return Err(Error::PackageNotFound(req.to_string()));
            }

            // identical NEVRAs keep the strongest (lowest priority) repository
            for &i in &candidates {
                let pkg = &info.packages[i];
                match discovered.entry(pkg.to_string()) {
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert(i);
                    }
                    std::collections::btree_map::Entry::Occupied(mut slot) => {
                        let held = self.repositories[info.packages[*slot.get()].repository].priority;
                        let offered = self.repositories[pkg.repository].priority;
                        if held > offered {
                            slot.insert(i);
                        }
                    }
                }
            }

            matched.push(info.packages[candidates[0]].name.clone());
        }

        // roots pin their name: the closure never admits an alternate version
        let mut pinned: HashMap<String, String> = HashMap::new();
        for &i in discovered.values() {
            let pkg = &info.packages[i];
            pinned.insert(pkg.name.clone(), pkg.to_string());
        }

        loop {
            let frontier: Vec<usize> = discovered.values().copied().collect();
            let before = discovered.len();

            for idx in frontier {
                for wanted in self.requires(info, idx) {
                    let pkg = &info.packages[wanted];
                    let nevra = pkg.to_string();
                    if discovered.contains_key(&nevra) {
                        continue;
                    }
                    if let Some(pin) = pinned.get(&pkg.name) {
                        debug!(
                            excluded = %nevra,
                            pinned = %pin,
                            "excluding package because its name is pinned"
                        );
                    } else {
                        discovered.insert(nevra, wanted);
                    }
                }
            }

            if discovered.len() == before {
                break;
            }
        }

        let mut involved: Vec<Package> = discovered
            .values()
            .map(|&i| info.packages[i].clone())
            .collect();
        involved.sort_by(|a, b| a.compare_nevra(b));

        // drop provides nobody in the reduced set requires; this shrinks the
        // solver's variable universe by an order of magnitude on real repos
        let required_caps: HashSet<&str> = involved
            .iter()
            .flat_map(|p| p.requires.iter())
            .map(|r| r.name.as_str())
            .collect();
        let required_caps: HashSet<String> =
            required_caps.into_iter().map(str::to_string).collect();
        for pkg in &mut involved {
            let own_name = pkg.name.clone();
            pkg.provides
                .retain(|prov| required_caps.contains(&prov.name) || prov.name == own_name);
        }

        Ok((matched, involved))
    }

    /// Providers of everything `packages[idx]` requires
    fn requires(&self, info: &PackageInfo, idx: usize) -> Vec<usize> {
        let pkg = &info.packages[idx];
        let mut wants = Vec::new();
        for req in &pkg.requires {
            match info.provides.get(&req.name) {
                Some(providers) => {
                    debug!(
                        package = %pkg.name,
                        requirement = %req,
                        providers = providers.len(),
                        "requirement has candidate providers"
                    );
                    wants.extend(providers.iter().copied());
                }
                None => {
                    debug!(
                        package = %pkg.name,
                        requirement = %req,
                        "requirement cannot be satisfied by the universe"
                    );
                }
            }
        }
        wants
    }
}
