// src/lib.rs

//! rpmlock — reproducible RPM install sets for hermetic builds
//!
//! Given cached repository metadata, a list of required package names and a
//! few policy flags, rpmlock computes a minimal closed set of RPMs whose
//! dependency graph is acyclic and writes it as a deterministic lock
//! document.
//!
//! # Architecture
//!
//! - Loader: streaming decode of repomd/primary/filelists metadata
//! - Reducer: shrink the universe to the packages that could participate
//! - Resolver: boolean encoding plus a DPLL search, newest versions first
//! - Lock builder: provider map, concrete dependency lists, cycle breaking

pub mod cancel;
pub mod compression;
mod error;
pub mod lock;
pub mod metadata;
pub mod reducer;
pub mod repository;
pub mod sat;
pub mod version;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use lock::{build_lockfile, LockFile, LockedPackage};
pub use metadata::{Checksum, Entry, Package};
pub use reducer::RepoReducer;
pub use repository::{CacheHelper, Repositories, Repository};
pub use sat::{Resolution, Resolver};
pub use version::{rpmvercmp, EntryFlags, RpmVersion};
