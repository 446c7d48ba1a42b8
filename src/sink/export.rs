/// Metadata-only mode: accepted candidates go to a labelled JSON document
use super::{ClipSink, StoredClip};
use crate::collector::CandidateItem;
use crate::ledger::ContentId;
use crate::persist::write_json_atomic;
use crate::query::clean_query;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One exported clip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportEntry {
    pub id: ContentId,
    pub caption: String,
    pub url: String,
}

/// `{label: {query: [entry, ...]}}`
pub type ExportDocument = BTreeMap<String, BTreeMap<String, Vec<ExportEntry>>>;

pub struct JsonExportSink {
    path: PathBuf,
    label: String,
    document: ExportDocument,
}

impl JsonExportSink {
    /// Export file for this run: `<clean label>_<clean query>_<timestamp>.json`
    pub fn new(export_dir: &Path, label: &str, query: &str) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(anyhow!("JSON output requires an intended label"));
        }

        let file_name = format!(
            "{}_{}_{}.json",
            clean_query(label),
            clean_query(query),
            Local::now().format("%Y%m%d_%H%M%S")
        );

        Ok(Self {
            path: export_dir.join(file_name),
            label: label.to_string(),
            document: ExportDocument::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &ExportDocument {
        &self.document
    }

    /// Number of entries exported so far
    pub fn len(&self) -> usize {
        self.document
            .values()
            .flat_map(|queries| queries.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClipSink for JsonExportSink {
    fn name(&self) -> &str {
        "json export"
    }

    async fn store(&mut self, query: &str, item: &CandidateItem) -> Result<StoredClip> {
        self.document
            .entry(self.label.clone())
            .or_default()
            .entry(query.to_string())
            .or_default()
            .push(ExportEntry {
                id: item.id.clone(),
                caption: item.title.clone(),
                url: item.url.clone(),
            });

        // rewritten in full each time so an interrupted run still leaves valid JSON
        write_json_atomic(&self.path, &self.document).await?;
        info!("📝 Exported {} to {}", item.id, self.path.display());

        Ok(StoredClip {
            location: self.path.clone(),
            already_present: false,
        })
    }

    fn throttled(&self) -> bool {
        false
    }
}
