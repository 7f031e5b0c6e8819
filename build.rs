// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("rpmlock")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve RPM dependencies into a reproducible lock file")
        .subcommand_required(false)
        .subcommand(
            Command::new("resolve")
                .about("Resolve dependencies of the given packages and emit a lock file")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Required package names (bare names or NEVRA prefixes)"),
                )
                .arg(
                    Arg::new("repofiles")
                        .short('r')
                        .long("repofile")
                        .default_value("repo.yaml")
                        .help("Repository information file; can be given multiple times"),
                )
                .arg(
                    Arg::new("arch")
                        .short('a')
                        .long("arch")
                        .default_value("x86_64")
                        .help("Target architecture"),
                )
                .arg(
                    Arg::new("base_system")
                        .long("basesystem")
                        .help("Base system package; \"scratch\" disables it"),
                )
                .arg(
                    Arg::new("nobest")
                        .short('n')
                        .long("nobest")
                        .action(clap::ArgAction::SetTrue)
                        .help("Allow picking versions which are not the newest"),
                )
                .arg(
                    Arg::new("force_ignore_regex")
                        .long("force-ignore-with-dependencies")
                        .help("Regex of packages to exclude together with everything only they require"),
                )
                .arg(
                    Arg::new("only_allow_regex")
                        .long("only-allow")
                        .help("If non-empty, only packages matching one of these regexes survive"),
                )
                .arg(
                    Arg::new("ignore_missing")
                        .long("ignore-missing")
                        .action(clap::ArgAction::SetTrue)
                        .help("Skip required names that match nothing instead of failing"),
                )
                .arg(
                    Arg::new("cache_dir")
                        .short('c')
                        .long("cache-dir")
                        .default_value(".rpmlock-cache")
                        .help("Metadata cache directory"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Lock file to write; stdout when omitted"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("rpmlock.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
