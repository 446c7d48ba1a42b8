/// Identity ledger: the per-run set of content ids that must not be accepted again
///
/// The ledger is rebuilt at the start of every run from durable evidence
/// (downloaded file names, session mappings, earlier JSON exports, the
/// exclusion list) and only grows while the run is in progress.

pub mod evidence;
pub mod filename;

pub use evidence::{
    evidence_for_query, EvidenceSource, ExclusionEvidence, FilenameEvidence, JsonExportEvidence,
    SessionMappingEvidence,
};
pub use filename::FilenameIdExtractor;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Opaque identifier of one piece of upstream content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Trimmed, non-empty id or `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Ids show up as both JSON strings and JSON numbers in the wild
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Number(n) => Self::parse(&n.to_string()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of already-seen content ids for one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    seen: HashSet<ContentId>,
}

impl Ledger {
    /// Empty ledger, for runs with no prior evidence
    pub fn new() -> Self {
        Self::default()
    }

    /// Union every evidence source into a fresh ledger.
    ///
    /// A source that is missing or unreadable is skipped with a warning. Any
    /// source naming an id is enough to exclude it.
    pub async fn build(query: &str, sources: &[Box<dyn EvidenceSource>]) -> Self {
        let mut ledger = Self::new();

        for source in sources {
            match source.collect().await {
                Ok(ids) => {
                    debug!("📋 {} contributed {} ids for '{}'", source.name(), ids.len(), query);
                    ledger.seen.extend(ids);
                }
                Err(e) => {
                    warn!("Skipping {} evidence for '{}': {}", source.name(), query, e);
                }
            }
        }

        info!("📚 Ledger for '{}' holds {} known ids", query, ledger.seen.len());
        ledger
    }

    /// True when the id has not been seen in any evidence or earlier in this run
    pub fn is_new(&self, id: &ContentId) -> bool {
        !self.seen.contains(id)
    }

    /// Record an accepted id. Accepting a known id is a no-op; the return
    /// value tells whether the id was newly inserted.
    pub fn accept(&mut self, id: ContentId) -> bool {
        self.seen.insert(id)
    }

    /// Check-and-set in one step: accept the id only if it is new
    pub fn try_accept(&mut self, id: &ContentId) -> bool {
        if self.is_new(id) {
            self.seen.insert(id.clone())
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentId> {
        self.seen.iter()
    }
}

impl FromIterator<ContentId> for Ledger {
    fn from_iter<I: IntoIterator<Item = ContentId>>(iter: I) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvidenceError;
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn id(raw: &str) -> ContentId {
        ContentId::parse(raw).unwrap()
    }

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl EvidenceSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
            Ok(self.0.iter().map(|raw| id(raw)).collect())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl EvidenceSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
            Err(EvidenceError::Missing(PathBuf::from("nowhere.json")))
        }
    }

    #[test]
    fn test_content_id_parsing() {
        assert_eq!(id("  42 ").as_str(), "42");
        assert!(ContentId::parse("   ").is_none());
        assert_eq!(ContentId::from_json(&serde_json::json!(537301017)).unwrap().as_str(), "537301017");
        assert_eq!(ContentId::from_json(&serde_json::json!("77")).unwrap().as_str(), "77");
        assert!(ContentId::from_json(&serde_json::json!(null)).is_none());
    }

    #[test]
    fn test_accept_is_idempotent() {
        let mut ledger = Ledger::new();
        assert!(ledger.accept(id("1")));
        let once = ledger.clone();
        assert!(!ledger.accept(id("1")));
        assert_eq!(ledger, once);
        assert!(!ledger.is_new(&id("1")));
    }

    #[test]
    fn test_try_accept() {
        let mut ledger: Ledger = vec![id("5")].into_iter().collect();
        assert!(!ledger.try_accept(&id("5")));
        assert!(ledger.try_accept(&id("6")));
        assert!(!ledger.try_accept(&id("6")));
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_build_unions_sources_and_skips_failures() {
        let sources: Vec<Box<dyn EvidenceSource>> = vec![
            Box::new(FixedSource(vec!["1", "2"])),
            Box::new(BrokenSource),
            Box::new(FixedSource(vec!["2", "3"])),
        ];

        let ledger = Ledger::build("q", &sources).await;
        assert_eq!(ledger.len(), 3);
        for raw in ["1", "2", "3"] {
            assert!(!ledger.is_new(&id(raw)));
        }
        assert!(ledger.is_new(&id("4")));
    }
}
