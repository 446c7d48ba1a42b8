pub mod download;
pub mod export;

pub use download::DownloadSink;
pub use export::JsonExportSink;

use crate::collector::CandidateItem;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Where an accepted candidate was put
#[derive(Debug, Clone, PartialEq)]
pub struct StoredClip {
    pub location: PathBuf,
    /// The target was already there before this run
    pub already_present: bool,
}

/// Destination for accepted candidates.
///
/// A sink failure is per-item: the harvest loop logs it, remembers the id
/// for the rest of the run and moves on.
#[async_trait]
pub trait ClipSink: Send {
    fn name(&self) -> &str;

    async fn store(&mut self, query: &str, item: &CandidateItem) -> Result<StoredClip>;

    /// Whether a per-item pause is due after a successful store
    fn throttled(&self) -> bool {
        true
    }
}
