/// User-curated exclusion lists, one JSON file per query
use crate::error::EvidenceError;
use crate::ledger::ContentId;
use crate::persist::write_json_atomic;
use crate::query::{clean_query, ignore_list_file_name};
use crate::session::{now_timestamp, SessionRecorder};
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const DESCRIPTION: &str = "List of stock video IDs to ignore during scraping";

/// In-memory view of one exclusion list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionList {
    /// Excluded ids and their optional notes
    entries: BTreeMap<ContentId, Option<String>>,
}

impl ExclusionList {
    pub fn contains(&self, id: &ContentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ContentId> {
        self.entries.keys()
    }

    pub fn note(&self, id: &ContentId) -> Option<&str> {
        self.entries.get(id).and_then(|n| n.as_deref())
    }

    /// Interpret a hand-editable list file.
    ///
    /// `ignored_video_ids` may be an array of ids (strings or numbers) or an
    /// object mapping id to an optional note. A separate `notes` object adds
    /// notes to ids listed in the array form.
    fn from_value(value: &Value) -> Option<Self> {
        let mut list = Self::default();
        let root = value.as_object()?;

        match root.get("ignored_video_ids") {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(id) = ContentId::from_json(item) {
                        list.entries.insert(id, None);
                    }
                }
            }
            Some(Value::Object(map)) => {
                for (raw, note) in map {
                    if let Some(id) = ContentId::parse(raw) {
                        list.entries.insert(id, note.as_str().map(str::to_string));
                    }
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => return None,
        }

        if let Some(Value::Object(notes)) = root.get("notes") {
            for (raw, note) in notes {
                if let (Some(id), Some(note)) = (ContentId::parse(raw), note.as_str()) {
                    list.entries.insert(id, Some(note.to_string()));
                }
            }
        }

        Some(list)
    }
}

#[derive(Serialize)]
struct ExclusionFile<'a> {
    query: &'a str,
    ignored_video_ids: Vec<&'a ContentId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    notes: BTreeMap<&'a ContentId, &'a str>,
    last_updated: String,
    total_ignored: usize,
    description: &'static str,
}

/// Outcome of importing a session record into an exclusion list
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub original_query: String,
    pub clean_query: String,
    pub list_path: PathBuf,
    pub found: usize,
    pub already_present: usize,
    pub added: usize,
    pub dry_run: bool,
}

/// CRUD over the exclusion lists in one directory.
///
/// Every operation is idempotent and writes only when the list changes.
#[derive(Debug, Clone)]
pub struct ExclusionStore {
    dir: PathBuf,
}

impl ExclusionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Deterministic list path for a query
    pub fn path_for(&self, query: &str) -> PathBuf {
        self.dir.join(ignore_list_file_name(query))
    }

    /// Parse a list file
    pub async fn read_file(path: &Path) -> Result<ExclusionList, EvidenceError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EvidenceError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(EvidenceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&content).map_err(|source| EvidenceError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        ExclusionList::from_value(&value).ok_or_else(|| EvidenceError::Malformed {
            path: path.to_path_buf(),
            source: serde::de::Error::custom("expected an object with `ignored_video_ids`"),
        })
    }

    /// Load the list for a query; a missing file is an empty list.
    ///
    /// A malformed file is an error rather than an empty list so that a
    /// hand-edit typo is never overwritten by the next save.
    pub async fn load(&self, query: &str) -> Result<ExclusionList> {
        match Self::read_file(&self.path_for(query)).await {
            Ok(list) => Ok(list),
            Err(EvidenceError::Missing(_)) => Ok(ExclusionList::default()),
            Err(e) => Err(anyhow!("{}", e)),
        }
    }

    async fn save(&self, query: &str, list: &ExclusionList) -> Result<()> {
        let path = self.path_for(query);
        let file = ExclusionFile {
            query,
            ignored_video_ids: list.entries.keys().collect(),
            notes: list
                .entries
                .iter()
                .filter_map(|(id, note)| note.as_deref().map(|n| (id, n)))
                .collect(),
            last_updated: now_timestamp(),
            total_ignored: list.len(),
            description: DESCRIPTION,
        };
        write_json_atomic(&path, &file).await?;
        debug!("💾 Saved {} ignored ids to {}", list.len(), path.display());
        Ok(())
    }

    /// Add ids; returns how many were not already present
    pub async fn add<I>(&self, query: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = ContentId>,
    {
        let mut list = self.load(query).await?;
        let before = list.len();
        for id in ids {
            list.entries.entry(id).or_insert(None);
        }
        let added = list.len() - before;

        if added > 0 {
            self.save(query, &list).await?;
            info!("🚫 Added {} ids to the '{}' ignore list", added, clean_query(query));
        }
        Ok(added)
    }

    /// Add one id with a note, replacing any previous note.
    /// Returns true when the id was not yet excluded.
    pub async fn add_with_note(&self, query: &str, id: ContentId, note: &str) -> Result<bool> {
        let mut list = self.load(query).await?;
        let note = Some(note.to_string());
        let previous = list.entries.insert(id, note.clone());
        let is_new = previous.is_none();

        if previous != Some(note) {
            self.save(query, &list).await?;
        }
        Ok(is_new)
    }

    /// Remove ids; returns how many were present
    pub async fn remove<I>(&self, query: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = ContentId>,
    {
        let mut list = self.load(query).await?;
        let removed = ids
            .into_iter()
            .filter(|id| list.entries.remove(id).is_some())
            .count();

        if removed > 0 {
            self.save(query, &list).await?;
            info!("✅ Removed {} ids from the '{}' ignore list", removed, clean_query(query));
        }
        Ok(removed)
    }

    /// Empty the list; returns how many ids it held
    pub async fn clear(&self, query: &str) -> Result<usize> {
        let list = self.load(query).await?;
        let removed = list.len();

        if removed > 0 {
            self.save(query, &ExclusionList::default()).await?;
            info!("🧹 Cleared {} ids from the '{}' ignore list", removed, clean_query(query));
        }
        Ok(removed)
    }

    /// Number of excluded ids
    pub async fn status(&self, query: &str) -> Result<usize> {
        Ok(self.load(query).await?.len())
    }

    /// Exclude every id mapped in a session record file.
    ///
    /// The target list is chosen from the record's own query, so a record
    /// from `downloads/dolly_zoom/` lands in `dolly_zoom_ignore_list.json`.
    pub async fn import_from_metadata(&self, metadata_path: &Path, dry_run: bool) -> Result<ImportReport> {
        let record = SessionRecorder::read_record(metadata_path).await?;
        let query = record
            .display_query()
            .ok_or_else(|| anyhow!("No query recorded in {}", metadata_path.display()))?
            .to_string();

        let ids: Vec<ContentId> = record.video_file_mappings.keys().cloned().collect();
        let list = self.load(&query).await?;
        let already_present = ids.iter().filter(|id| list.contains(id)).count();

        let added = if dry_run || ids.is_empty() {
            0
        } else {
            self.add(&query, ids.iter().cloned()).await?
        };

        Ok(ImportReport {
            clean_query: clean_query(&query),
            list_path: self.path_for(&query),
            original_query: query,
            found: ids.len(),
            already_present,
            added,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(raw: &[&str]) -> Vec<ContentId> {
        raw.iter().filter_map(|r| ContentId::parse(r)).collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ExclusionStore::new(temp_dir.path().to_path_buf());

        assert_eq!(store.add("Q", ids(&["1", "2", "3"])).await.unwrap(), 3);
        assert_eq!(store.status("Q").await.unwrap(), 3);
        assert_eq!(store.remove("Q", ids(&["2"])).await.unwrap(), 1);
        assert_eq!(store.status("Q").await.unwrap(), 2);
        assert_eq!(store.clear("Q").await.unwrap(), 2);
        assert_eq!(store.status("Q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_operations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ExclusionStore::new(temp_dir.path().to_path_buf());

        assert_eq!(store.add("q", ids(&["7", "7", " "])).await.unwrap(), 1);
        assert_eq!(store.add("q", ids(&["7"])).await.unwrap(), 0);
        assert_eq!(store.remove("q", ids(&["8"])).await.unwrap(), 0);
        assert_eq!(store.clear("empty").await.unwrap(), 0);
        assert!(!store.path_for("empty").exists());
    }

    #[tokio::test]
    async fn test_hand_edited_formats() {
        let temp_dir = TempDir::new().unwrap();
        let store = ExclusionStore::new(temp_dir.path().to_path_buf());

        fs::write(
            store.path_for("sea"),
            r#"{"ignored_video_ids": {"111": "blurry", "222": null}}"#,
        )
        .await
        .unwrap();
        let list = store.load("sea").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.note(&ContentId::parse("111").unwrap()), Some("blurry"));

        fs::write(store.path_for("sky"), r#"{"ignored_video_ids": [333, "444"]}"#)
            .await
            .unwrap();
        assert_eq!(store.status("sky").await.unwrap(), 2);

        fs::write(store.path_for("bad"), "[1, 2").await.unwrap();
        assert!(store.add("bad", ids(&["1"])).await.is_err());
        assert_eq!(fs::read_to_string(store.path_for("bad")).await.unwrap(), "[1, 2");
    }

    #[tokio::test]
    async fn test_notes_survive_save() {
        let temp_dir = TempDir::new().unwrap();
        let store = ExclusionStore::new(temp_dir.path().to_path_buf());
        let id = ContentId::parse("99999").unwrap();

        assert!(store.add_with_note("q", id.clone(), "watermark").await.unwrap());
        assert!(!store.add_with_note("q", id.clone(), "watermark").await.unwrap());
        store.add("q", ids(&["1"])).await.unwrap();

        let list = store.load("q").await.unwrap();
        assert_eq!(list.note(&id), Some("watermark"));
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn test_import_from_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = ExclusionStore::new(temp_dir.path().join("ignore_list"));
        let metadata = temp_dir.path().join("query_metadata.json");

        fs::write(
            &metadata,
            r#"{"original_query": "Dolly Zoom", "video_file_mappings": {"537301017": {}, "571470338": {}}}"#,
        )
        .await
        .unwrap();
        store.add("Dolly Zoom", ids(&["537301017"])).await.unwrap();

        let preview = store.import_from_metadata(&metadata, true).await.unwrap();
        assert_eq!(preview.found, 2);
        assert_eq!(preview.already_present, 1);
        assert_eq!(preview.added, 0);
        assert_eq!(store.status("Dolly Zoom").await.unwrap(), 1);

        let report = store.import_from_metadata(&metadata, false).await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.clean_query, "dolly_zoom");
        assert!(report.list_path.ends_with("dolly_zoom_ignore_list.json"));
        assert_eq!(store.status("dolly zoom").await.unwrap(), 2);
    }
}
