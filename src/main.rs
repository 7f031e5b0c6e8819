// src/main.rs
//! rpmlock - CLI Entry Point

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "rpmlock")]
#[command(version)]
#[command(about = "Resolve RPM dependencies into a reproducible lock file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve dependencies of the given packages and emit a lock file
    Resolve {
        /// Required package names (bare names or NEVRA prefixes)
        #[arg(required = true)]
        packages: Vec<String>,

        /// Repository information file; can be given multiple times
        #[arg(short = 'r', long = "repofile", default_value = "repo.yaml")]
        repofiles: Vec<PathBuf>,

        /// Target architecture
        #[arg(short, long, default_value = "x86_64")]
        arch: String,

        /// Base system package (e.g. fedora-release-container); "scratch" disables it
        #[arg(long = "basesystem")]
        base_system: Option<String>,

        /// Allow picking versions which are not the newest
        #[arg(short, long)]
        nobest: bool,

        /// Regex of packages to exclude together with everything only they require
        #[arg(long = "force-ignore-with-dependencies")]
        force_ignore_regex: Vec<String>,

        /// If non-empty, only packages matching one of these regexes survive
        #[arg(long = "only-allow")]
        only_allow_regex: Vec<String>,

        /// Skip required names that match nothing instead of failing
        #[arg(long)]
        ignore_missing: bool,

        /// Metadata cache directory
        #[arg(short, long, default_value = ".rpmlock-cache")]
        cache_dir: PathBuf,

        /// Lock file to write; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Resolve {
            packages,
            repofiles,
            arch,
            base_system,
            nobest,
            force_ignore_regex,
            only_allow_regex,
            ignore_missing,
            cache_dir,
            output,
        }) => commands::cmd_resolve(commands::ResolveOptions {
            targets: packages,
            repofiles,
            arch,
            base_system,
            nobest,
            force_ignore_regex,
            only_allow_regex,
            ignore_missing,
            cache_dir,
            output,
        }),

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rpmlock", &mut io::stdout());
            Ok(())
        }

        None => {
            println!("rpmlock v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'rpmlock --help' for usage information");
            Ok(())
        }
    }
}
