/// Result collection from the upstream search surface
///
/// The harvest loop only sees [`ResultCollector`]; how batches are produced
/// (HTML scraping here) is the collector's business.

pub mod extract;
pub mod session;
pub mod stock_site;

pub use session::SessionContext;
pub use stock_site::StockSiteCollector;

use crate::error::CollectorError;
use crate::ledger::ContentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One piece of content surfaced by a search, not yet checked for duplication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub id: ContentId,
    pub title: String,
    pub duration_seconds: Option<f64>,
    pub size_bytes: Option<u64>,
    /// Direct URL of the clip to download
    pub url: String,
}

/// Opaque continuation handed back to the collector for the next batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of candidates
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub items: Vec<CandidateItem>,
    /// `None` once the upstream sequence is exhausted
    pub next_page: Option<PageToken>,
}

/// Source of candidate batches for a query.
///
/// Network failures are retried inside the collector; a batch that still
/// cannot be fetched comes back empty with the following page token so the
/// caller simply moves on. Only authentication problems surface as errors.
#[async_trait]
pub trait ResultCollector: Send + Sync {
    async fn next_batch(&self, query: &str, page: Option<&PageToken>) -> Result<Batch, CollectorError>;
}
