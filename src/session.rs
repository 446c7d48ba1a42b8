/// Per-query session records (`query_metadata.json`)
///
/// One record lives in each query directory. It carries run statistics and
/// the id -> file mapping that the ledger reads back on the next run.
use crate::error::{EvidenceError, PersistenceError};
use crate::ledger::evidence::dir_entries;
use crate::ledger::{ContentId, FilenameIdExtractor};
use crate::persist::{staging_path, write_json_atomic};
use crate::query::clean_query;
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File name of the session record inside a query directory
pub const METADATA_FILE: &str = "query_metadata.json";

/// Timestamp layout used in every record
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in [`TIMESTAMP_FORMAT`]
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Durable facts about all sessions run for one query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// Query text as typed by the user (older records call this `query`)
    #[serde(default, alias = "query")]
    pub original_query: String,

    #[serde(default)]
    pub clean_query: String,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub last_updated: String,

    #[serde(default)]
    pub total_videos_downloaded: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_download_session: Option<DownloadSession>,

    /// Accepted ids and the files they were stored as
    #[serde(default, deserialize_with = "lenient_mappings")]
    pub video_file_mappings: BTreeMap<ContentId, ClipMapping>,
}

/// Statistics of the most recent run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DownloadSession {
    pub requested_count: u64,
    pub new_downloads: u64,
    pub session_timestamp: String,
}

/// Where an accepted id ended up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClipMapping {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub download_timestamp: String,
    #[serde(default)]
    pub mapping_source: String,
}

impl From<Value> for ClipMapping {
    /// Hand-written records may map an id to a bare file name or to nothing useful
    fn from(value: Value) -> Self {
        match value {
            Value::String(filename) => Self {
                filename,
                ..Default::default()
            },
            Value::Object(fields) => {
                let text = |key: &str| {
                    fields
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Self {
                    filename: text("filename"),
                    title: text("title"),
                    url: text("url"),
                    download_timestamp: text("download_timestamp"),
                    mapping_source: text("mapping_source"),
                }
            }
            _ => Self::default(),
        }
    }
}

/// Mappings from a raw `video_file_mappings` value. Every key counts whatever
/// its value looks like; a plain list of ids is accepted too.
pub fn mappings_from_value(value: Value) -> BTreeMap<ContentId, ClipMapping> {
    match value {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(key, value)| Some((ContentId::parse(&key)?, ClipMapping::from(value))))
            .collect(),
        Value::Array(ids) => ids
            .iter()
            .filter_map(ContentId::from_json)
            .map(|id| (id, ClipMapping::default()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn lenient_mappings<'de, D>(deserializer: D) -> Result<BTreeMap<ContentId, ClipMapping>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(mappings_from_value(Value::deserialize(deserializer)?))
}

impl SessionRecord {
    /// Fresh record for a query, created now
    pub fn new(query: &str) -> Self {
        let now = now_timestamp();
        Self {
            original_query: query.to_string(),
            clean_query: clean_query(query),
            created_at: now.clone(),
            last_updated: now,
            total_videos_downloaded: 0,
            last_download_session: None,
            video_file_mappings: BTreeMap::new(),
        }
    }

    /// `created_at` as a timestamp, when it is one
    pub fn created_at_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.created_at, TIMESTAMP_FORMAT).ok()
    }

    /// Query text usable for ranking: original first, clean form as fallback
    pub fn display_query(&self) -> Option<&str> {
        [self.original_query.as_str(), self.clean_query.as_str()]
            .into_iter()
            .find(|q| !q.trim().is_empty())
    }
}

/// Captions must share more than this fraction of their words with a file
/// name before the file is mapped to them
const TITLE_MATCH_THRESHOLD: f64 = 0.3;

/// A caption found in an earlier JSON export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTitle {
    pub title: String,
    /// Export file the caption was read from
    pub source_file: String,
}

/// Captions of every id in the JSON exports found in `dirs`
pub async fn exported_titles(dirs: &[PathBuf]) -> BTreeMap<ContentId, ExportedTitle> {
    let mut titles = BTreeMap::new();
    for dir in dirs {
        let paths = match dir_entries(dir).await {
            Ok(paths) => paths,
            Err(EvidenceError::Missing(_)) => continue,
            Err(e) => {
                warn!("Skipping exports: {}", e);
                continue;
            }
        };

        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if !name.ends_with(".json") || name == METADATA_FILE {
                continue;
            }
            let document = match SessionRecorder::read_document(&path).await {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping export: {}", e);
                    continue;
                }
            };

            let items = document
                .as_object()
                .into_iter()
                .flat_map(|labels| labels.values())
                .filter_map(Value::as_object)
                .flat_map(|queries| queries.values())
                .filter_map(Value::as_array)
                .flatten();
            for item in items {
                let Some(id) = item.get("id").and_then(ContentId::from_json) else {
                    continue;
                };
                let title = ["caption", "title"]
                    .iter()
                    .find_map(|key| item.get(*key).and_then(Value::as_str))
                    .unwrap_or_default();
                titles.insert(
                    id,
                    ExportedTitle {
                        title: title.to_string(),
                        source_file: name.clone(),
                    },
                );
            }
        }
    }
    titles
}

/// Share of the caption's words that also appear in the file stem
fn title_overlap(stem: &str, caption: &str) -> f64 {
    let stem_words: HashSet<String> = stem
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let caption_words: HashSet<String> = caption
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    if caption_words.is_empty() {
        return 0.0;
    }
    caption_words.intersection(&stem_words).count() as f64 / caption_words.len() as f64
}

/// Best caption for a file stem, if any clears [`TITLE_MATCH_THRESHOLD`]
fn best_title_match<'a>(
    stem: &str,
    titles: &'a BTreeMap<ContentId, ExportedTitle>,
) -> Option<(&'a ContentId, &'a ExportedTitle)> {
    let mut best = None;
    let mut best_score = TITLE_MATCH_THRESHOLD;
    for (id, exported) in titles {
        let score = title_overlap(stem, &exported.title);
        if score > best_score {
            best = Some((id, exported));
            best_score = score;
        }
    }
    best
}

/// Summary of one query directory, for reporting
#[derive(Debug, Clone)]
pub struct QueryDirectorySummary {
    pub directory: PathBuf,
    pub record: Option<SessionRecord>,
    pub video_files: usize,
}

/// Reads and updates session records under the download directory
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    download_dir: PathBuf,
    extractor: FilenameIdExtractor,
}

impl SessionRecorder {
    pub fn new(download_dir: PathBuf, video_extensions: &[String]) -> Self {
        Self {
            download_dir,
            extractor: FilenameIdExtractor::new(video_extensions),
        }
    }

    /// Directory holding everything stored for a query
    pub fn query_dir(&self, query: &str) -> PathBuf {
        self.download_dir.join(clean_query(query))
    }

    pub fn metadata_path(&self, query: &str) -> PathBuf {
        self.query_dir(query).join(METADATA_FILE)
    }

    /// Parse a record file, reporting why it could not be used
    pub async fn read_record(path: &Path) -> Result<SessionRecord, EvidenceError> {
        let document = Self::read_document(path).await?;
        serde_json::from_value(document).map_err(|source| EvidenceError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Ids under `video_file_mappings`, read without the rest of the schema
    pub async fn read_mapped_ids(path: &Path) -> Result<HashSet<ContentId>, EvidenceError> {
        let mut document = Self::read_document(path).await?;
        let mappings = document
            .get_mut("video_file_mappings")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(mappings_from_value(mappings).into_keys().collect())
    }

    pub(crate) async fn read_document(path: &Path) -> Result<Value, EvidenceError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EvidenceError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(EvidenceError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| EvidenceError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the record for a query, if one exists and parses
    pub async fn load(&self, query: &str) -> Option<SessionRecord> {
        let path = self.metadata_path(query);
        match Self::read_record(&path).await {
            Ok(record) => Some(record),
            Err(EvidenceError::Missing(_)) => None,
            Err(e) => {
                warn!("Ignoring unreadable session record: {}", e);
                None
            }
        }
    }

    /// Record the outcome of a run.
    ///
    /// Creates the record on first use. Afterwards `last_updated` moves,
    /// `total_videos_downloaded` grows by `newly_accepted`, and
    /// `last_download_session` is replaced.
    pub async fn record_session(
        &self,
        query: &str,
        requested: u64,
        newly_accepted: u64,
    ) -> Result<SessionRecord, PersistenceError> {
        let path = self.metadata_path(query);
        let mut record = self.load_for_update(query, &path).await;

        let now = now_timestamp();
        record.last_updated = now.clone();
        record.total_videos_downloaded += newly_accepted;
        record.last_download_session = Some(DownloadSession {
            requested_count: requested,
            new_downloads: newly_accepted,
            session_timestamp: now,
        });

        write_json_atomic(&path, &record).await?;
        info!(
            "📝 Session recorded for '{}': {} new, {} total",
            query, newly_accepted, record.total_videos_downloaded
        );
        Ok(record)
    }

    /// Upsert the mapping for one accepted id
    pub async fn record_mapping(
        &self,
        query: &str,
        id: &ContentId,
        mapping: ClipMapping,
    ) -> Result<(), PersistenceError> {
        let path = self.metadata_path(query);
        let mut record = self.load_for_update(query, &path).await;

        record.video_file_mappings.insert(id.clone(), mapping);
        record.last_updated = now_timestamp();

        write_json_atomic(&path, &record).await?;
        debug!("🔗 Mapped {} in {}", id, path.display());
        Ok(())
    }

    /// Existing record, or a new one. An unparsable file is moved aside to
    /// `<file>.corrupt` instead of being silently overwritten.
    async fn load_for_update(&self, query: &str, path: &Path) -> SessionRecord {
        match Self::read_record(path).await {
            Ok(record) => record,
            Err(EvidenceError::Missing(_)) => SessionRecord::new(query),
            Err(e) => {
                warn!("Starting a fresh session record: {}", e);
                let aside = staging_path(path, ".corrupt");
                if let Err(e) = fs::rename(path, &aside).await {
                    warn!("Could not move {} aside: {}", path.display(), e);
                }
                SessionRecord::new(query)
            }
        }
    }

    /// Count the video files actually present in a directory
    pub fn count_video_files(&self, dir: &Path) -> usize {
        self.video_files(dir).len()
    }

    /// Video files directly inside `dir`, sorted
    pub fn video_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.extractor.is_video(path))
            .collect();
        files.sort();
        files
    }

    /// Summarise one query directory
    pub async fn summarize_dir(&self, dir: &Path) -> QueryDirectorySummary {
        let record = match Self::read_record(&dir.join(METADATA_FILE)).await {
            Ok(record) => Some(record),
            Err(EvidenceError::Missing(_)) => None,
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        QueryDirectorySummary {
            directory: dir.to_path_buf(),
            record,
            video_files: self.count_video_files(dir),
        }
    }

    /// Every query directory under the download directory that has a record
    pub async fn list_all(&self) -> Result<Vec<QueryDirectorySummary>> {
        let mut dirs: Vec<PathBuf> = WalkDir::new(&self.download_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .filter(|dir| dir.join(METADATA_FILE).exists())
            .collect();
        dirs.sort();

        let mut summaries = Vec::with_capacity(dirs.len());
        for dir in dirs {
            summaries.push(self.summarize_dir(&dir).await);
        }
        Ok(summaries)
    }

    /// Add mappings for video files that have no entry yet.
    ///
    /// An id in the file name is taken as is. Otherwise the file is matched by
    /// title against the captions in the JSON exports under `export_dirs`.
    /// Returns the `(file name, id)` pairs that were (or, on a dry run, would
    /// be) added.
    pub async fn backfill_mappings(
        &self,
        dir: &Path,
        export_dirs: &[PathBuf],
        dry_run: bool,
    ) -> Result<Vec<(String, ContentId)>> {
        let path = dir.join(METADATA_FILE);
        let fallback_query = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut record = match Self::read_record(&path).await {
            Ok(record) => record,
            Err(EvidenceError::Missing(_)) => {
                info!("No {} in {}, creating one", METADATA_FILE, dir.display());
                let mut record = SessionRecord::new(&fallback_query);
                record.original_query = "unknown".to_string();
                record.clean_query = fallback_query.clone();
                record
            }
            Err(e) => return Err(e.into()),
        };

        let mapped_files: HashSet<String> = record
            .video_file_mappings
            .values()
            .map(|m| m.filename.clone())
            .collect();

        let extractor = self.extractor.clone().with_prefix(record.clean_query.clone());
        let unmapped: Vec<PathBuf> = self
            .video_files(dir)
            .into_iter()
            .filter(|file| {
                file.file_name()
                    .is_some_and(|n| !mapped_files.contains(&*n.to_string_lossy()))
            })
            .collect();
        if unmapped.is_empty() {
            return Ok(Vec::new());
        }

        let titles = exported_titles(export_dirs).await;
        if !titles.is_empty() {
            debug!("📄 {} captions available for title matching", titles.len());
        }

        let mut added = Vec::new();
        for file in unmapped {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            let (id, title, source) = match extractor.extract(&name) {
                Some(id) => {
                    let title = format!("Video_{}", id);
                    (id, title, "filename_extraction".to_string())
                }
                None => match best_title_match(&stem, &titles) {
                    Some((id, exported)) => (
                        id.clone(),
                        exported.title.clone(),
                        format!("json_match_{}", exported.source_file),
                    ),
                    None => {
                        debug!("No id for file: {}", name);
                        continue;
                    }
                },
            };
            if record.video_file_mappings.contains_key(&id) {
                continue;
            }

            record.video_file_mappings.insert(
                id.clone(),
                ClipMapping {
                    filename: name.clone(),
                    title,
                    url: String::new(),
                    download_timestamp: "unknown - mapped retroactively".to_string(),
                    mapping_source: source,
                },
            );
            added.push((name, id));
        }

        if !added.is_empty() && !dry_run {
            record.last_updated = now_timestamp();
            write_json_atomic(&path, &record).await?;
            info!("✅ Added {} mappings to {}", added.len(), path.display());
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recorder(dir: &Path) -> SessionRecorder {
        SessionRecorder::new(dir.to_path_buf(), &["mp4".to_string(), "mov".to_string()])
    }

    #[tokio::test]
    async fn test_record_session_creates_then_accumulates() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());

        assert!(recorder.load("Ocean Waves").await.is_none());

        let first = recorder.record_session("Ocean Waves", 10, 4).await.unwrap();
        assert_eq!(first.clean_query, "ocean_waves");
        assert_eq!(first.total_videos_downloaded, 4);
        assert!(first.created_at_time().is_some());

        let second = recorder.record_session("Ocean Waves", 5, 3).await.unwrap();
        assert_eq!(second.total_videos_downloaded, 7);
        assert_eq!(second.created_at, first.created_at);
        let last = second.last_download_session.unwrap();
        assert_eq!(last.requested_count, 5);
        assert_eq!(last.new_downloads, 3);

        let loaded = recorder.load("Ocean Waves").await.unwrap();
        assert_eq!(loaded.total_videos_downloaded, 7);
    }

    #[tokio::test]
    async fn test_record_mapping_preserves_statistics() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let id = ContentId::parse("55512").unwrap();

        recorder.record_session("sunset", 3, 2).await.unwrap();
        recorder
            .record_mapping(
                "sunset",
                &id,
                ClipMapping {
                    filename: "55512_sunset.mp4".to_string(),
                    mapping_source: "download".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = recorder.load("sunset").await.unwrap();
        assert_eq!(record.total_videos_downloaded, 2);
        assert_eq!(record.video_file_mappings[&id].filename, "55512_sunset.mp4");
    }

    #[tokio::test]
    async fn test_legacy_query_key_and_corrupt_record() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let dir = recorder.query_dir("dolly zoom");
        fs::create_dir_all(&dir).await.unwrap();

        fs::write(
            dir.join(METADATA_FILE),
            r#"{"query": "Dolly Zoom", "video_file_mappings": {"537301017": {"filename": "a.mp4"}}}"#,
        )
        .await
        .unwrap();
        let record = recorder.load("dolly zoom").await.unwrap();
        assert_eq!(record.original_query, "Dolly Zoom");
        assert_eq!(record.video_file_mappings.len(), 1);

        fs::write(dir.join(METADATA_FILE), "{ not json").await.unwrap();
        assert!(recorder.load("dolly zoom").await.is_none());

        let record = recorder.record_session("dolly zoom", 1, 1).await.unwrap();
        assert_eq!(record.total_videos_downloaded, 1);
        assert!(dir.join("query_metadata.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_backfill_mappings_from_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let dir = temp_dir.path().join("city_skyline");
        fs::create_dir_all(&dir).await.unwrap();

        fs::write(dir.join("123456789_night.mp4"), b"x").await.unwrap();
        fs::write(dir.join("skyline.mov"), b"x").await.unwrap();
        fs::write(dir.join("notes.txt"), b"x").await.unwrap();

        let preview = recorder.backfill_mappings(&dir, &[], true).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert!(!dir.join(METADATA_FILE).exists());

        let added = recorder.backfill_mappings(&dir, &[], false).await.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].1.as_str(), "123456789");

        // second pass finds nothing new
        assert!(recorder.backfill_mappings(&dir, &[], false).await.unwrap().is_empty());

        let summary = recorder.summarize_dir(&dir).await;
        assert_eq!(summary.video_files, 2);
        assert_eq!(summary.record.unwrap().clean_query, "city_skyline");
    }

    #[tokio::test]
    async fn test_backfill_matches_files_without_ids_by_title() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let dir = temp_dir.path().join("ocean_waves");
        let exports = temp_dir.path().join("json_outputs");
        fs::create_dir_all(&dir).await.unwrap();
        fs::create_dir_all(&exports).await.unwrap();

        fs::write(dir.join("Ocean_waves_crashing_on_rocks.mp4"), b"x").await.unwrap();
        fs::write(dir.join("clip_0003.mp4"), b"x").await.unwrap();
        fs::write(dir.join("Desert_dunes.mp4"), b"x").await.unwrap();
        fs::write(
            exports.join("nature_ocean_waves_20250101_120000.json"),
            serde_json::json!({
                "Nature": {
                    "ocean waves": [
                        {"id": "537301017", "caption": "Ocean waves crashing on rocks", "url": "u"},
                        {"id": "571470338", "caption": "Aerial view of a forest", "url": "u"}
                    ]
                }
            })
            .to_string(),
        )
        .await
        .unwrap();

        let added = recorder.backfill_mappings(&dir, &[exports], false).await.unwrap();
        assert_eq!(
            added,
            vec![(
                "Ocean_waves_crashing_on_rocks.mp4".to_string(),
                ContentId::parse("537301017").unwrap()
            )]
        );

        let record = SessionRecorder::read_record(&dir.join(METADATA_FILE)).await.unwrap();
        let mapping = &record.video_file_mappings[&ContentId::parse("537301017").unwrap()];
        assert_eq!(mapping.title, "Ocean waves crashing on rocks");
        assert_eq!(mapping.mapping_source, "json_match_nature_ocean_waves_20250101_120000.json");
    }

    #[test]
    fn test_title_overlap() {
        assert_eq!(title_overlap("Ocean_waves_at_dusk", "Ocean waves, at dusk!"), 1.0);
        assert_eq!(title_overlap("ocean_waves_3", "Aerial view of a forest"), 0.0);
        assert!((title_overlap("waves-rocks", "Ocean waves crashing on rocks") - 0.4).abs() < 1e-9);
        assert_eq!(title_overlap("anything", "!!!"), 0.0);
    }

    #[tokio::test]
    async fn test_string_valued_mappings_keep_the_record() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let dir = recorder.query_dir("sunset");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::json!({
                "original_query": "sunset",
                "clean_query": "sunset",
                "created_at": "2024-05-01 10:00:00",
                "last_updated": "2024-05-01 10:00:00",
                "total_videos_downloaded": 40,
                "video_file_mappings": {"55512": "sunset_clip"}
            })
            .to_string(),
        )
        .await
        .unwrap();

        let loaded = recorder.load("sunset").await.unwrap();
        let id = ContentId::parse("55512").unwrap();
        assert_eq!(loaded.video_file_mappings[&id].filename, "sunset_clip");

        let record = recorder.record_session("sunset", 5, 1).await.unwrap();
        assert_eq!(record.total_videos_downloaded, 41);
        assert_eq!(record.created_at, "2024-05-01 10:00:00");
        assert!(record.video_file_mappings.contains_key(&id));
        assert!(!dir.join("query_metadata.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_record_without_query_fields() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());
        let dir = recorder.query_dir("night sky");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(
            dir.join(METADATA_FILE),
            r#"{"total_videos_downloaded": 3, "last_download_session": {"new_downloads": 3}, "video_file_mappings": ["1", 2]}"#,
        )
        .await
        .unwrap();

        let record = recorder.load("night sky").await.unwrap();
        assert!(record.original_query.is_empty());
        assert_eq!(record.display_query(), None);
        assert_eq!(record.video_file_mappings.len(), 2);
        assert_eq!(record.last_download_session.unwrap().new_downloads, 3);

        let updated = recorder.record_session("night sky", 2, 2).await.unwrap();
        assert_eq!(updated.total_videos_downloaded, 5);
        assert!(!dir.join("query_metadata.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_list_all() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(temp_dir.path());

        recorder.record_session("alpha", 1, 1).await.unwrap();
        recorder.record_session("beta", 1, 0).await.unwrap();
        fs::create_dir_all(temp_dir.path().join("no_record")).await.unwrap();

        let all = recorder.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].directory.ends_with("alpha"));
    }
}
