/// Stock Clip Harvester
///
/// Collects new, never-before-seen video clips for a search query from a
/// stock footage site, remembers what was already taken across runs, and
/// ranks downloaded clips against their query text.

pub mod config;
pub mod error;
pub mod query;
pub mod persist;
pub mod ledger;
pub mod session;
pub mod exclusion;
pub mod collector;
pub mod filters;
pub mod sink;
pub mod harvest;
pub mod ranking;

// Re-export main types for easy access
pub use crate::config::Config;
pub use crate::error::{CollectorError, EvidenceError, PersistenceError};
pub use crate::ledger::{ContentId, EvidenceSource, Ledger};
pub use crate::session::{ClipMapping, SessionRecord, SessionRecorder};
pub use crate::exclusion::{ExclusionList, ExclusionStore};
pub use crate::collector::{Batch, CandidateItem, PageToken, ResultCollector, SessionContext, StockSiteCollector};
pub use crate::filters::CandidateFilter;
pub use crate::sink::{ClipSink, DownloadSink, JsonExportSink};
pub use crate::harvest::{HarvestOptions, HarvestReport, Harvester, StopReason};
pub use crate::ranking::{ClipRanker, RankedClip};
