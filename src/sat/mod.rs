// src/sat/mod.rs

//! Boolean encoding of the involved package set
//!
//! One variable per involved package, meaning "this package is installed".
//! Roots become at-least-one clauses, requires become implications towards
//! their providers, conflicts and shared names become pairwise exclusions.
//! Variables are ordered name-ascending and newest-first within a name;
//! since the solver branches in clause order and provider lists follow the
//! variable order, the newest installable version of every name wins unless
//! a conflict forces an alternative.

mod solver;

pub use solver::{Clause, ClauseKind, Literal, SolveError, Solver};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::metadata::{Entry, Package};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of a resolution
#[derive(Debug, Default)]
pub struct Resolution {
    /// Packages whose variable came out true
    pub install: Vec<Package>,
    /// Involved packages left out of the solution (diagnostic)
    pub excluded: Vec<Package>,
    /// Packages removed by the ignore pre-filter before encoding
    pub force_ignored: Vec<Package>,
}

/// Encodes the involved set and drives the DPLL search
#[derive(Debug)]
pub struct Resolver {
    nobest: bool,
    force_ignore: Vec<Regex>,
    only_allow: Vec<Regex>,
    vars: Vec<Package>,
    name_index: BTreeMap<String, Vec<usize>>,
    provides_index: HashMap<String, Vec<usize>>,
    force_ignored: Vec<Package>,
    ignored_caps: HashSet<String>,
    clauses: Vec<Clause>,
}

impl Resolver {
    /// Compile the ignore patterns up front; a bad pattern is fatal before
    /// any solving starts
    pub fn new(nobest: bool, force_ignore: &[String], only_allow: &[String]) -> Result<Self> {
        let force_ignore = compile(force_ignore)?;
        let only_allow = compile(only_allow)?;
        Ok(Self {
            nobest,
            force_ignore,
            only_allow,
            vars: Vec::new(),
            name_index: BTreeMap::new(),
            provides_index: HashMap::new(),
            force_ignored: Vec::new(),
            ignored_caps: HashSet::new(),
            clauses: Vec::new(),
        })
    }

    /// Apply the ignore pre-filter and build the variable table
    ///
    /// `roots` spares required names from the only-allow whitelist.
    pub fn load_involved_packages(&mut self, involved: Vec<Package>, roots: &[String]) -> Result<()> {
        let root_names: HashSet<&str> = roots.iter().map(String::as_str).collect();

        let mut vars = Vec::new();
        for pkg in involved {
            let printable = pkg.to_string();
            if let Some(rex) = self.force_ignore.iter().find(|r| r.is_match(&printable)) {
                warn!(
                    package = %printable,
                    pattern = %rex.as_str(),
                    "package is forcefully ignored"
                );
                self.note_ignored(pkg);
                continue;
            }
            if !self.only_allow.is_empty()
                && !root_names.contains(pkg.name.as_str())
                && !self.only_allow.iter().any(|r| r.is_match(&printable))
            {
                debug!(package = %printable, "package outside the only-allow whitelist");
                self.note_ignored(pkg);
                continue;
            }
            vars.push(pkg);
        }

        vars.sort_by(|a, b| a.compare_preference(b));

        self.name_index.clear();
        self.provides_index.clear();
        for (i, pkg) in vars.iter().enumerate() {
            self.name_index.entry(pkg.name.clone()).or_default().push(i);
            for prov in &pkg.provides {
                self.provides_index
                    .entry(prov.name.clone())
                    .or_default()
                    .push(i);
            }
            for file in &pkg.files {
                self.provides_index.entry(file.clone()).or_default().push(i);
            }
        }

        self.vars = vars;
        info!(
            variables = self.vars.len(),
            ignored = self.force_ignored.len(),
            "involved packages loaded"
        );
        Ok(())
    }

    fn note_ignored(&mut self, pkg: Package) {
        self.ignored_caps.insert(pkg.name.clone());
        for prov in &pkg.provides {
            self.ignored_caps.insert(prov.name.clone());
        }
        for file in &pkg.files {
            self.ignored_caps.insert(file.clone());
        }
        self.force_ignored.push(pkg);
    }

    /// Generate all clauses: roots, requires, conflicts, name exclusion
    pub fn construct_requirements(&mut self, matched: &[String]) -> Result<()> {
        let mut clauses = Vec::new();

        for name in matched {
            clauses.push(self.root_clause(name)?);
        }
        // a root may have been filtered away entirely; that is only legal
        // when the ignore patterns asked for it
        let mut clauses: Vec<Clause> = clauses.into_iter().flatten().collect();

        for (i, pkg) in self.vars.iter().enumerate() {
            for req in &pkg.requires {
                if self.ignored_caps.contains(&req.name) {
                    debug!(
                        package = %pkg,
                        capability = %req.name,
                        "requirement satisfied vacuously by an ignored package"
                    );
                    continue;
                }
                let providers = self.providers(req);
                if providers.contains(&i) {
                    continue;
                }
                let mut literals = vec![-(i as Literal + 1)];
                if providers.is_empty() {
                    debug!(
                        package = %pkg,
                        capability = %req.name,
                        "no provider; package cannot be installed"
                    );
                } else {
                    literals.extend(providers.iter().map(|&p| p as Literal + 1));
                }
                clauses.push(Clause {
                    literals,
                    kind: ClauseKind::Requires {
                        package: i,
                        capability: req.name.clone(),
                    },
                });
            }
        }

        for (i, pkg) in self.vars.iter().enumerate() {
            for conflict in &pkg.conflicts {
                for q in self.providers(conflict) {
                    if q == i {
                        continue;
                    }
                    clauses.push(Clause {
                        literals: vec![-(i as Literal + 1), -(q as Literal + 1)],
                        kind: ClauseKind::Conflict { a: i, b: q },
                    });
                }
            }
        }

        for (name, group) in &self.name_index {
            for (a, &i) in group.iter().enumerate() {
                for &j in &group[a + 1..] {
                    clauses.push(Clause {
                        literals: vec![-(i as Literal + 1), -(j as Literal + 1)],
                        kind: ClauseKind::NameExclusion { name: name.clone() },
                    });
                }
            }
        }

        info!(clauses = clauses.len(), "formula constructed");
        self.clauses = clauses;
        Ok(())
    }

    /// The at-least-one clause for a required name
    ///
    /// With best policy only the candidates carrying the newest EVR stay in
    /// the clause; with nobest every version is admissible.
    fn root_clause(&self, name: &str) -> Result<Option<Clause>> {
        let group = match self.name_index.get(name) {
            Some(group) if !group.is_empty() => group,
            _ => {
                if self.ignored_caps.contains(name) {
                    warn!(root = name, "required name is force-ignored, dropping root");
                    return Ok(None);
                }
                return Err(Error::Unsatisfiable {
                    capability: name.to_string(),
                    by: None,
                });
            }
        };

        let candidates: Vec<usize> = if self.nobest {
            self.check_ambiguous_root(name, group)?;
            group.clone()
        } else {
            // the group is newest-first; keep everything tied with the head
            let newest = &self.vars[group[0]].version;
            group
                .iter()
                .copied()
                .take_while(|&i| self.vars[i].version == *newest)
                .collect()
        };

        Ok(Some(Clause {
            literals: candidates.iter().map(|&i| i as Literal + 1).collect(),
            kind: ClauseKind::Root {
                name: name.to_string(),
            },
        }))
    }

    /// With nobest there is no version preference left to break a tie
    /// between equally-new candidates that exclude each other
    fn check_ambiguous_root(&self, name: &str, group: &[usize]) -> Result<()> {
        let newest = &self.vars[group[0]].version;
        let tied: Vec<usize> = group
            .iter()
            .copied()
            .take_while(|&i| self.vars[i].version == *newest)
            .collect();
        if tied.len() < 2 {
            return Ok(());
        }
        for (a, &i) in tied.iter().enumerate() {
            for &j in &tied[a + 1..] {
                if self.conflicts_with(i, j) || self.conflicts_with(j, i) {
                    return Err(Error::AmbiguousRoot {
                        name: name.to_string(),
                        candidates: tied.iter().map(|&t| self.vars[t].to_string()).collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn conflicts_with(&self, i: usize, j: usize) -> bool {
        self.vars[i]
            .conflicts
            .iter()
            .any(|c| self.providers(c).contains(&j))
    }

    /// Involved packages whose provides (or files) satisfy the entry
    fn providers(&self, entry: &Entry) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(candidates) = self.provides_index.get(&entry.name) {
            for &i in candidates {
                let pkg = &self.vars[i];
                let by_provides = pkg
                    .provides
                    .iter()
                    .any(|prov| prov.name == entry.name && prov.satisfies(entry));
                // file capabilities are unversioned by nature
                let by_files = pkg.files.iter().any(|f| f == &entry.name);
                if (by_provides || by_files) && !out.contains(&i) {
                    out.push(i);
                }
            }
        }
        out
    }

    /// Run the search and split the variables into the output sets
    pub fn resolve(&mut self, cancel: &CancelToken) -> Result<Resolution> {
        let mut solver = Solver::new(self.vars.len(), self.clauses.clone());
        let model = solver.solve(cancel).map_err(|e| self.map_solve_error(e))?;

        let mut install = Vec::new();
        let mut excluded = Vec::new();
        for (i, pkg) in self.vars.iter().enumerate() {
            if model[i] {
                install.push(pkg.clone());
            } else {
                excluded.push(pkg.clone());
            }
        }

        info!(
            install = install.len(),
            excluded = excluded.len(),
            force_ignored = self.force_ignored.len(),
            "resolution complete"
        );

        Ok(Resolution {
            install,
            excluded,
            force_ignored: self.force_ignored.clone(),
        })
    }

    fn map_solve_error(&self, e: SolveError) -> Error {
        match e {
            SolveError::Cancelled => Error::Cancelled,
            SolveError::Unsatisfiable(kind) => match kind {
                ClauseKind::Root { name } => Error::Unsatisfiable {
                    capability: name,
                    by: None,
                },
                ClauseKind::Requires {
                    package,
                    capability,
                } => Error::Unsatisfiable {
                    capability,
                    by: Some(self.vars[package].to_string()),
                },
                ClauseKind::Conflict { a, b } => Error::CapabilityConflict {
                    a: self.vars[a].to_string(),
                    b: self.vars[b].to_string(),
                },
                ClauseKind::NameExclusion { name } => Error::Unsatisfiable {
                    capability: name,
                    by: None,
                },
            },
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::make_package;
    use crate::version::EntryFlags;

    fn provides(pkg: &mut Package, caps: &[&str]) {
        pkg.provides = caps.iter().map(|c| Entry::named(*c)).collect();
    }

    fn requires(pkg: &mut Package, caps: &[&str]) {
        pkg.requires = caps.iter().map(|c| Entry::named(*c)).collect();
    }

    fn run(
        involved: Vec<Package>,
        matched: &[&str],
        nobest: bool,
        force_ignore: &[&str],
    ) -> Result<Resolution> {
        let matched: Vec<String> = matched.iter().map(|s| s.to_string()).collect();
        let force_ignore: Vec<String> = force_ignore.iter().map(|s| s.to_string()).collect();
        let mut resolver = Resolver::new(nobest, &force_ignore, &[])?;
        resolver.load_involved_packages(involved, &matched)?;
        resolver.construct_requirements(&matched)?;
        resolver.resolve(&CancelToken::new())
    }

    fn names(packages: &[Package]) -> Vec<String> {
        packages.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_simple_requires_chain() {
        let mut bash = make_package("bash", "5.2.15-3", "x86_64");
        provides(&mut bash, &["bash"]);
        requires(&mut bash, &["libc.so.6"]);
        let mut glibc = make_package("glibc", "2.37-4", "x86_64");
        provides(&mut glibc, &["glibc", "libc.so.6"]);

        let result = run(vec![bash, glibc], &["bash"], false, &[]).unwrap();
        assert_eq!(names(&result.install), vec!["bash", "glibc"]);
    }

    #[test]
    fn test_best_picks_newest() {
        let mut new = make_package("bash", "5.2.15-1", "x86_64");
        provides(&mut new, &["bash"]);
        let mut old = make_package("bash", "5.1.0-1", "x86_64");
        provides(&mut old, &["bash"]);

        let result = run(vec![old, new], &["bash"], false, &[]).unwrap();
        assert_eq!(result.install.len(), 1);
        assert_eq!(result.install[0].version.version, "5.2.15");
        assert_eq!(result.excluded.len(), 1);
    }

    fn self_provides(pkg: &mut Package) {
        pkg.provides = vec![Entry {
            name: pkg.name.clone(),
            flags: Some(EntryFlags::Eq),
            epoch: Some(pkg.version.epoch),
            version: Some(pkg.version.version.clone()),
            release: pkg.version.release.clone(),
        }];
    }

    #[test]
    fn test_best_fails_when_newest_is_conflicted() {
        let mut new = make_package("bash", "5.2.15-1", "x86_64");
        self_provides(&mut new);
        let mut old = make_package("bash", "5.1.0-1", "x86_64");
        self_provides(&mut old);
        let mut blocker = make_package("blocker", "1.0-1", "x86_64");
        provides(&mut blocker, &["blocker"]);
        blocker.conflicts = vec![Entry {
            name: "bash".to_string(),
            flags: Some(EntryFlags::Ge),
            epoch: Some(0),
            version: Some("5.2".to_string()),
            release: None,
        }];

        let err = run(
            vec![old.clone(), new.clone(), blocker.clone()],
            &["bash", "blocker"],
            false,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::CapabilityConflict { .. }));

        // nobest allows the older version instead of failing
        let result = run(vec![old, new, blocker], &["bash", "blocker"], true, &[]).unwrap();
        let bash = result.install.iter().find(|p| p.name == "bash").unwrap();
        assert_eq!(bash.version.version, "5.1.0");
    }

    #[test]
    fn test_name_exclusion_single_version() {
        let mut v1 = make_package("libfoo", "1.0-1", "x86_64");
        provides(&mut v1, &["libfoo"]);
        let mut v2 = make_package("libfoo", "2.0-1", "x86_64");
        provides(&mut v2, &["libfoo"]);
        let mut app = make_package("app", "1.0-1", "x86_64");
        provides(&mut app, &["app"]);
        requires(&mut app, &["libfoo"]);

        let result = run(vec![v1, v2, app], &["app"], true, &[]).unwrap();
        let foos: Vec<_> = result
            .install
            .iter()
            .filter(|p| p.name == "libfoo")
            .collect();
        assert_eq!(foos.len(), 1);
        assert_eq!(foos[0].version.version, "2.0");
    }

    #[test]
    fn test_file_provider_resolves_requirement() {
        let mut foo = make_package("foo", "1.0-1", "x86_64");
        provides(&mut foo, &["foo"]);
        requires(&mut foo, &["libbar.so.1()"]);
        let mut bar = make_package("bar", "1.0-1", "x86_64");
        provides(&mut bar, &["bar"]);
        bar.files.push("libbar.so.1()".to_string());

        let result = run(vec![foo, bar], &["foo"], false, &[]).unwrap();
        assert_eq!(names(&result.install), vec!["bar", "foo"]);
    }

    #[test]
    fn test_versioned_requirement_selects_matching_provider() {
        let mut app = make_package("app", "1.0-1", "x86_64");
        provides(&mut app, &["app"]);
        app.requires = vec![Entry {
            name: "lib".to_string(),
            flags: Some(EntryFlags::Ge),
            epoch: Some(0),
            version: Some("2.0".to_string()),
            release: None,
        }];
        let mut old_lib = make_package("libold", "1.0-1", "x86_64");
        old_lib.provides = vec![Entry {
            name: "lib".to_string(),
            flags: Some(EntryFlags::Eq),
            epoch: Some(0),
            version: Some("1.0".to_string()),
            release: Some("1".to_string()),
        }];
        let mut new_lib = make_package("libnew", "2.5-1", "x86_64");
        new_lib.provides = vec![Entry {
            name: "lib".to_string(),
            flags: Some(EntryFlags::Eq),
            epoch: Some(0),
            version: Some("2.5".to_string()),
            release: Some("1".to_string()),
        }];

        let result = run(vec![app, old_lib, new_lib], &["app"], false, &[]).unwrap();
        assert_eq!(names(&result.install), vec!["app", "libnew"]);
    }

    #[test]
    fn test_force_ignore_removes_and_vacuously_satisfies() {
        let mut app = make_package("app", "1.0-1", "x86_64");
        provides(&mut app, &["app"]);
        requires(&mut app, &["glibc-langpack-en"]);
        let mut langpack = make_package("glibc-langpack-en", "2.37-4", "x86_64");
        provides(&mut langpack, &["glibc-langpack-en"]);

        let result = run(
            vec![app, langpack],
            &["app"],
            false,
            &["^glibc-langpack-.*"],
        )
        .unwrap();
        assert_eq!(names(&result.install), vec!["app"]);
        assert_eq!(names(&result.force_ignored), vec!["glibc-langpack-en"]);
    }

    #[test]
    fn test_missing_provider_without_ignore_is_fatal() {
        let mut app = make_package("app", "1.0-1", "x86_64");
        provides(&mut app, &["app"]);
        requires(&mut app, &["does-not-exist"]);

        let err = run(vec![app], &["app"], false, &[]).unwrap_err();
        match err {
            Error::Unsatisfiable { capability, by } => {
                assert_eq!(capability, "does-not-exist");
                assert_eq!(by.as_deref(), Some("app-1.0-1.x86_64"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = Resolver::new(false, &["[broken".to_string()], &[]).unwrap_err();
        assert!(matches!(err, Error::Regex(_)));
    }

    #[test]
    fn test_only_allow_spares_roots() {
        let mut app = make_package("app", "1.0-1", "x86_64");
        provides(&mut app, &["app"]);
        let mut extra = make_package("extra", "1.0-1", "x86_64");
        provides(&mut extra, &["extra"]);

        let matched = vec!["app".to_string()];
        let mut resolver = Resolver::new(false, &[], &["^never-matches$".to_string()]).unwrap();
        resolver
            .load_involved_packages(vec![app, extra], &matched)
            .unwrap();
        resolver.construct_requirements(&matched).unwrap();
        let result = resolver.resolve(&CancelToken::new()).unwrap();

        assert_eq!(names(&result.install), vec!["app"]);
        assert_eq!(names(&result.force_ignored), vec!["extra"]);
    }

    #[test]
    fn test_repo_priority_duplicate_resolved_upstream() {
        // identical NEVRA from two repositories never reaches the solver;
        // the reducer dedups, so a single variable remains
        let mut a = make_package("foo", "1.0-1", "x86_64");
        provides(&mut a, &["foo"]);
        let result = run(vec![a], &["foo"], false, &[]).unwrap();
        assert_eq!(result.install.len(), 1);
    }

    #[test]
    fn test_ambiguous_root_with_nobest() {
        // two equally-new candidates for the root name that exclude each
        // other; without a version preference there is no way to choose
        let mut a = make_package("dual", "1.0-1", "x86_64");
        provides(&mut a, &["dual"]);
        a.conflicts = vec![Entry::named("dual")];
        let mut b = make_package("dual", "1.0-1", "noarch");
        provides(&mut b, &["dual"]);
        b.conflicts = vec![Entry::named("dual")];

        let err = run(vec![a, b], &["dual"], true, &[]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousRoot { .. }));
    }

    #[test]
    fn test_circular_requires_both_installed() {
        let mut a = make_package("a", "1.0-1", "x86_64");
        provides(&mut a, &["a"]);
        requires(&mut a, &["b"]);
        let mut b = make_package("b", "1.0-1", "x86_64");
        provides(&mut b, &["b"]);
        requires(&mut b, &["a"]);

        let result = run(vec![a, b], &["a", "b"], false, &[]).unwrap();
        assert_eq!(names(&result.install), vec!["a", "b"]);
    }
}
