//! Typed errors for the library seams.
//!
//! Application code (binaries, the harvest loop) works in `anyhow::Result`;
//! these enums exist where a caller needs to tell failure kinds apart.

use std::path::PathBuf;

/// A duplicate-evidence source could not be read. Always recoverable: the
/// ledger logs it and carries on without that source.
#[derive(thiserror::Error, Debug)]
pub enum EvidenceError {
    #[error("evidence file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures surfaced by a result collector.
#[derive(thiserror::Error, Debug)]
pub enum CollectorError {
    #[error("upstream requires authentication: {0}")]
    AuthenticationRequired(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid search URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Writing durable state failed. Previously persisted state is left intact
/// because every write goes through a temp file and a rename.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
