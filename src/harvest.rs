/// The pull loop that turns search pages into new, unique clips
use crate::collector::{CandidateItem, PageToken, ResultCollector};
use crate::config::Config;
use crate::error::CollectorError;
use crate::filters::CandidateFilter;
use crate::ledger::{ContentId, Ledger};
use crate::session::SessionRecorder;
use crate::sink::ClipSink;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The requested number of clips was reached
    Satisfied,
    /// The upstream sequence ran out of pages
    Exhausted,
    PageLimit,
    /// Too many consecutive pages without a single new candidate
    EmptyPages,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Satisfied => "requested count reached",
            Self::Exhausted => "no more results",
            Self::PageLimit => "page limit reached",
            Self::EmptyPages => "too many pages without new content",
        };
        f.write_str(text)
    }
}

/// Outcome of one harvest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestReport {
    pub query: String,
    pub requested: u64,
    pub accepted: u64,
    /// Passed the filters but was already in the ledger
    pub skipped_seen: u64,
    /// Rejected by the candidate filters, seen or not
    pub skipped_filtered: u64,
    pub failed: u64,
    pub pages_scanned: u32,
    pub stop_reason: StopReason,
}

impl HarvestReport {
    fn new(query: &str, requested: u64) -> Self {
        Self {
            query: query.to_string(),
            requested,
            accepted: 0,
            skipped_seen: 0,
            skipped_filtered: 0,
            failed: 0,
            pages_scanned: 0,
            stop_reason: StopReason::Exhausted,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Query: '{}'\n  Accepted: {}/{}\n  Already seen: {}\n  Filtered: {}\n  Failed: {}\n  Pages scanned: {}\n  Stopped: {}",
            self.query,
            self.accepted,
            self.requested,
            self.skipped_seen,
            self.skipped_filtered,
            self.failed,
            self.pages_scanned,
            self.stop_reason
        )
    }
}

/// Loop limits
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub max_pages: u32,
    pub max_empty_pages: u32,
    pub delay: Duration,
}

impl HarvestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.scraper.max_pages,
            max_empty_pages: config.scraper.max_empty_pages,
            delay: config.delay(),
        }
    }
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            max_pages: 10,
            max_empty_pages: 3,
            delay: Duration::from_secs(1),
        }
    }
}

enum Verdict {
    Accepted { pause: bool },
    Seen,
    Filtered,
    Failed,
    /// Already turned away earlier in this run
    Skipped,
}

pub struct Harvester {
    collector: Box<dyn ResultCollector>,
    sink: Box<dyn ClipSink>,
    filter: CandidateFilter,
    recorder: SessionRecorder,
    options: HarvestOptions,
}

impl Harvester {
    pub fn new(
        collector: Box<dyn ResultCollector>,
        sink: Box<dyn ClipSink>,
        filter: CandidateFilter,
        recorder: SessionRecorder,
        options: HarvestOptions,
    ) -> Self {
        Self {
            collector,
            sink,
            filter,
            recorder,
            options,
        }
    }

    /// Pull batches until `requested` new clips are stored or a stop
    /// condition hits, then record the session.
    ///
    /// Only an authentication failure aborts the run; the session is still
    /// recorded with whatever was accepted before it.
    pub async fn run(&mut self, query: &str, requested: u64, mut ledger: Ledger) -> Result<HarvestReport> {
        info!("🚀 Harvesting {} new clips for '{}' via {}", requested, query, self.sink.name());
        if !self.filter.is_empty() {
            debug!("Filters active: {:?}", self.filter);
        }

        let mut report = HarvestReport::new(query, requested);
        let outcome = self.pull(query, requested, &mut ledger, &mut report).await;

        self.recorder
            .record_session(query, requested, report.accepted)
            .await?;

        match outcome {
            Ok(reason) => {
                report.stop_reason = reason;
                if report.accepted == 0 {
                    warn!("⚠️  No new clips found for '{}' ({})", query, reason);
                } else {
                    info!("🎉 Harvested {}/{} clips for '{}' ({})", report.accepted, requested, query, reason);
                }
                Ok(report)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pull(
        &mut self,
        query: &str,
        requested: u64,
        ledger: &mut Ledger,
        report: &mut HarvestReport,
    ) -> Result<StopReason, CollectorError> {
        let mut page: Option<PageToken> = None;
        let mut exhausted = false;
        let mut empty_streak = 0u32;
        let mut turned_away: HashSet<ContentId> = HashSet::new();

        loop {
            if report.accepted >= requested {
                return Ok(StopReason::Satisfied);
            }
            if exhausted {
                return Ok(StopReason::Exhausted);
            }
            if report.pages_scanned >= self.options.max_pages {
                return Ok(StopReason::PageLimit);
            }
            if empty_streak >= self.options.max_empty_pages {
                return Ok(StopReason::EmptyPages);
            }

            if report.pages_scanned > 0 {
                self.pause().await;
            }

            let batch = self.collector.next_batch(query, page.as_ref()).await?;
            report.pages_scanned += 1;
            debug!("Page {}: {} candidates", report.pages_scanned, batch.items.len());

            let mut fresh_on_page = 0u32;
            for item in &batch.items {
                if report.accepted >= requested {
                    break;
                }
                match self.evaluate(query, item, ledger, &turned_away).await {
                    Verdict::Accepted { pause } => {
                        fresh_on_page += 1;
                        report.accepted += 1;
                        if pause && report.accepted < requested {
                            self.pause().await;
                        }
                    }
                    Verdict::Seen => report.skipped_seen += 1,
                    Verdict::Filtered => {
                        fresh_on_page += 1;
                        report.skipped_filtered += 1;
                        turned_away.insert(item.id.clone());
                    }
                    Verdict::Failed => {
                        fresh_on_page += 1;
                        report.failed += 1;
                        turned_away.insert(item.id.clone());
                    }
                    Verdict::Skipped => {}
                }
            }

            if fresh_on_page == 0 {
                empty_streak += 1;
                debug!("No new candidates on page {} ({} in a row)", report.pages_scanned, empty_streak);
            } else {
                empty_streak = 0;
            }

            match batch.next_page {
                Some(next) => page = Some(next),
                None => exhausted = true,
            }
        }
    }

    async fn evaluate(
        &mut self,
        query: &str,
        item: &CandidateItem,
        ledger: &mut Ledger,
        turned_away: &HashSet<ContentId>,
    ) -> Verdict {
        if turned_away.contains(&item.id) {
            return Verdict::Skipped;
        }
        if let Err(rejection) = self.filter.check(item) {
            info!("🚫 Filtered {}: {}", item.id, rejection);
            return Verdict::Filtered;
        }
        if !ledger.is_new(&item.id) {
            debug!("⏭️  Already have {}", item.id);
            return Verdict::Seen;
        }

        match self.sink.store(query, item).await {
            Ok(stored) => {
                ledger.accept(item.id.clone());
                Verdict::Accepted {
                    pause: self.sink.throttled() && !stored.already_present,
                }
            }
            Err(e) => {
                warn!("❌ Failed to store {}: {:#}", item.id, e);
                Verdict::Failed
            }
        }
    }

    async fn pause(&self) {
        if !self.options.delay.is_zero() {
            tokio::time::sleep(self.options.delay).await;
        }
    }
}
