// src/commands.rs
//! Command handlers for the rpmlock CLI

use anyhow::Result;
use rpmlock::{
    build_lockfile, CacheHelper, CancelToken, RepoReducer, Repositories, Resolver,
};
use std::path::PathBuf;
use tracing::info;

/// Everything the resolve pipeline needs, decoded from the CLI surface
pub struct ResolveOptions {
    pub targets: Vec<String>,
    pub repofiles: Vec<PathBuf>,
    pub arch: String,
    pub base_system: Option<String>,
    pub nobest: bool,
    pub force_ignore_regex: Vec<String>,
    pub only_allow_regex: Vec<String>,
    pub ignore_missing: bool,
    pub cache_dir: PathBuf,
    pub output: Option<PathBuf>,
}

/// Run the full pipeline: load → reduce → solve → lock
pub fn cmd_resolve(opts: ResolveOptions) -> Result<()> {
    let cancel = CancelToken::new();
    let repos = Repositories::load(&opts.repofiles)?;
    let cache = CacheHelper::new(&opts.cache_dir);

    // "scratch" is the conventional spelling for "no base system"
    let base_system = opts
        .base_system
        .as_deref()
        .filter(|base| *base != "scratch");

    let mut reducer = RepoReducer::new(
        repos.repositories.clone(),
        base_system,
        opts.arch.clone(),
        cache.clone(),
    );
    info!("Loading packages.");
    reducer.load(&cancel)?;

    info!("Initial reduction of involved packages.");
    let (matched, involved) = reducer.resolve(&opts.targets, opts.ignore_missing)?;

    let mut solver = Resolver::new(
        opts.nobest,
        &opts.force_ignore_regex,
        &opts.only_allow_regex,
    )?;
    info!("Loading involved packages into the resolver.");
    solver.load_involved_packages(involved, &matched)?;
    info!("Adding required packages to the resolver.");
    solver.construct_requirements(&matched)?;
    info!("Solving.");
    let resolution = solver.resolve(&cancel)?;

    for pkg in &resolution.install {
        info!(package = %pkg, "selected");
    }

    let mirrors = repos
        .repositories
        .iter()
        .map(|repo| cache.resolve_mirrors(repo))
        .collect::<rpmlock::Result<Vec<_>>>()?;

    let cli_arguments: Vec<String> = std::env::args().skip(1).collect();
    let lock = build_lockfile(
        &repos.repositories,
        &mirrors,
        &resolution.install,
        &resolution.force_ignored,
        &matched,
        &opts.targets,
        &cli_arguments,
    )?;

    match &opts.output {
        Some(path) => lock.write_atomic(path)?,
        None => {
            let bytes = lock.to_json_bytes()?;
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }

    Ok(())
}
