/// Evidence sources the ledger is rebuilt from
use super::{ContentId, FilenameIdExtractor};
use crate::config::Config;
use crate::error::EvidenceError;
use crate::exclusion::ExclusionStore;
use crate::query::clean_query;
use crate::session::{SessionRecorder, METADATA_FILE};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// A durable record from which previously seen ids can be reconstructed
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// All ids this source knows about
    async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError>;
}

/// Entries of `dir`, sorted. A listing that fails part way is an error, not
/// a shorter list.
pub(crate) async fn dir_entries(dir: &Path) -> Result<Vec<PathBuf>, EvidenceError> {
    let io_error = |source: std::io::Error| EvidenceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EvidenceError::Missing(dir.to_path_buf()));
        }
        Err(source) => return Err(io_error(source)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Ids embedded in the names of already downloaded files
pub struct FilenameEvidence {
    dir: PathBuf,
    extractor: FilenameIdExtractor,
}

impl FilenameEvidence {
    pub fn new(dir: PathBuf, extractor: FilenameIdExtractor) -> Self {
        Self { dir, extractor }
    }
}

#[async_trait]
impl EvidenceSource for FilenameEvidence {
    fn name(&self) -> &str {
        "filename"
    }

    async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
        let mut ids = HashSet::new();
        for path in dir_entries(&self.dir).await? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            match self.extractor.extract(&name) {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!("No id in file name: {}", name),
            }
        }
        Ok(ids)
    }
}

/// Ids listed in the query's `video_file_mappings`
pub struct SessionMappingEvidence {
    path: PathBuf,
}

impl SessionMappingEvidence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl EvidenceSource for SessionMappingEvidence {
    fn name(&self) -> &str {
        "session mapping"
    }

    async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
        SessionRecorder::read_mapped_ids(&self.path).await
    }
}

/// Ids already present in earlier JSON exports for the same label/query pair
pub struct JsonExportEvidence {
    dir: PathBuf,
    label: Option<String>,
    query: String,
}

impl JsonExportEvidence {
    /// With no label, exports under any label count for the query
    pub fn new(dir: PathBuf, label: Option<String>, query: String) -> Self {
        Self { dir, label, query }
    }

    fn matches_query(&self, key: &str) -> bool {
        key == self.query || clean_query(key) == clean_query(&self.query)
    }

    fn ids_in_document(&self, document: &Value) -> HashSet<ContentId> {
        let mut ids = HashSet::new();
        let Some(labels) = document.as_object() else {
            return ids;
        };

        for (label, queries) in labels {
            if self.label.as_deref().is_some_and(|wanted| wanted != label) {
                continue;
            }
            let Some(queries) = queries.as_object() else {
                continue;
            };
            for (query, items) in queries {
                if !self.matches_query(query) {
                    continue;
                }
                let Some(items) = items.as_array() else {
                    continue;
                };
                ids.extend(
                    items
                        .iter()
                        .filter_map(|item| item.get("id"))
                        .filter_map(ContentId::from_json),
                );
            }
        }
        ids
    }

    async fn read_document(path: &Path) -> Result<Value, EvidenceError> {
        let content = fs::read_to_string(path).await.map_err(|source| EvidenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| EvidenceError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl EvidenceSource for JsonExportEvidence {
    fn name(&self) -> &str {
        "json export"
    }

    async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
        let mut ids = HashSet::new();
        for path in dir_entries(&self.dir).await? {
            let is_export = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != METADATA_FILE);
            if !is_export {
                continue;
            }

            // one bad export must not hide the others
            match Self::read_document(&path).await {
                Ok(document) => ids.extend(self.ids_in_document(&document)),
                Err(e) => warn!("Skipping export: {}", e),
            }
        }
        Ok(ids)
    }
}

/// Ids on the query's exclusion list
pub struct ExclusionEvidence {
    path: PathBuf,
}

impl ExclusionEvidence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl EvidenceSource for ExclusionEvidence {
    fn name(&self) -> &str {
        "exclusion list"
    }

    async fn collect(&self) -> Result<HashSet<ContentId>, EvidenceError> {
        let list = ExclusionStore::read_file(&self.path).await?;
        Ok(list.ids().cloned().collect())
    }
}

/// The four standard evidence sources for a query
pub fn evidence_for_query(config: &Config, query: &str, label: Option<&str>) -> Vec<Box<dyn EvidenceSource>> {
    let recorder = SessionRecorder::new(
        config.storage.download_dir.clone(),
        &config.storage.video_extensions,
    );
    let exclusions = ExclusionStore::new(config.storage.ignore_list_dir.clone());
    let extractor =
        FilenameIdExtractor::new(&config.storage.video_extensions).with_prefix(clean_query(query));

    vec![
        Box::new(FilenameEvidence::new(recorder.query_dir(query), extractor)),
        Box::new(SessionMappingEvidence::new(recorder.metadata_path(query))),
        Box::new(JsonExportEvidence::new(
            config.storage.export_dir.clone(),
            label.map(str::to_string),
            query.to_string(),
        )),
        Box::new(ExclusionEvidence::new(exclusions.path_for(query))),
    ]
}
