// src/error.rs

//! Central error type for the rpmlock library
//!
//! Every component reports through this enum; nothing substitutes a default
//! on failure. The CLI layer maps these onto `anyhow` for display.

use thiserror::Error;

/// Library-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed repository list file or conflicting configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or corrupt metadata in the cache directory
    #[error("Cache error for repository '{repository}': {reason}")]
    Cache { repository: String, reason: String },

    /// Decompression failure while reading cached metadata
    #[error(transparent)]
    Compression(#[from] crate::compression::CompressionError),

    /// XML decoding failure in repomd/primary/filelists/metalink payloads
    #[error("Metadata decode error in {file}: {reason}")]
    MetadataDecode { file: String, reason: String },

    /// A requested root name matched nothing in the universe
    #[error("Package {0} does not exist")]
    PackageNotFound(String),

    /// The formula has no satisfying assignment
    #[error("No solution: capability '{capability}' cannot be satisfied{}", .by.as_deref().map(|b| format!(" (required by {b})")).unwrap_or_default())]
    Unsatisfiable {
        capability: String,
        by: Option<String>,
    },

    /// A required name has several equally-new but mutually incompatible candidates
    #[error("Required package '{name}' is ambiguous between {candidates:?}")]
    AmbiguousRoot {
        name: String,
        candidates: Vec<String>,
    },

    /// Two selected packages conflict with each other
    #[error("Conflict between '{a}' and '{b}'")]
    CapabilityConflict { a: String, b: String },

    /// Post-solve materialization found a requires entry without a provider
    #[error("No provider for '{requirement}' required by '{package}'")]
    MissingProvider {
        requirement: String,
        package: String,
    },

    /// Invalid user-supplied regex pattern
    #[error("Invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Cooperative cancellation was requested
    #[error("Operation cancelled")]
    Cancelled,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock document serialization failure
    #[error("Failed to serialize lock document: {0}")]
    Serialize(#[from] serde_json::Error),
}
