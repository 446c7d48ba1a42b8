use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stock_clip_harvester::collector::{Batch, CandidateItem, PageToken, ResultCollector};
use stock_clip_harvester::config::{Config, ConfigBuilder};
use stock_clip_harvester::error::CollectorError;
use stock_clip_harvester::ledger::{evidence_for_query, ContentId, Ledger};
use stock_clip_harvester::session::{ClipMapping, SessionRecorder};
use stock_clip_harvester::sink::{ClipSink, JsonExportSink, StoredClip};
use stock_clip_harvester::{CandidateFilter, ExclusionStore, HarvestOptions, Harvester, StopReason};
use tempfile::TempDir;

/// Serves one fixed page of candidates
struct OnePageCollector {
    ids: Vec<&'static str>,
}

#[async_trait]
impl ResultCollector for OnePageCollector {
    async fn next_batch(&self, _query: &str, page: Option<&PageToken>) -> Result<Batch, CollectorError> {
        if page.is_some() {
            return Ok(Batch::default());
        }
        Ok(Batch {
            items: self.ids.iter().map(|id| candidate(id)).collect(),
            next_page: None,
        })
    }
}

struct RecordingSink {
    stored: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ClipSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn store(&mut self, _query: &str, item: &CandidateItem) -> anyhow::Result<StoredClip> {
        self.stored.lock().unwrap().push(item.id.to_string());
        Ok(StoredClip {
            location: item.id.as_str().into(),
            already_present: false,
        })
    }
}

fn candidate(id: &str) -> CandidateItem {
    CandidateItem {
        id: ContentId::parse(id).unwrap(),
        title: format!("Clip {}", id),
        duration_seconds: Some(12.0),
        size_bytes: Some(1024),
        url: format!("https://cdn.example.com/{}.mp4", id),
    }
}

fn id(raw: &str) -> ContentId {
    ContentId::parse(raw).unwrap()
}

fn workspace(temp_dir: &TempDir) -> Config {
    ConfigBuilder::new()
        .with_download_dir(temp_dir.path().join("downloads"))
        .with_ignore_list_dir(temp_dir.path().join("ignore_list"))
        .with_export_dir(temp_dir.path().join("json_outputs"))
        .with_delay(0.0)
        .build()
}

fn options() -> HarvestOptions {
    HarvestOptions {
        max_pages: 5,
        max_empty_pages: 3,
        delay: Duration::ZERO,
    }
}

async fn ledger_for(config: &Config, query: &str, label: Option<&str>) -> Ledger {
    let sources = evidence_for_query(config, query, label);
    Ledger::build(query, &sources).await
}

#[tokio::test]
async fn test_known_ids_from_files_mappings_and_exclusions_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let query = "ocean waves";

    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);
    let dir = recorder.query_dir(query);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("55512_Ocean_waves.mp4"), b"clip").await.unwrap();
    recorder
        .record_mapping(
            query,
            &id("55512"),
            ClipMapping {
                filename: "55512_Ocean_waves.mp4".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ExclusionStore::new(config.storage.ignore_list_dir.clone())
        .add(query, vec![id("99999")])
        .await
        .unwrap();

    let ledger = ledger_for(&config, query, None).await;
    assert!(!ledger.is_new(&id("55512")));
    assert!(!ledger.is_new(&id("99999")));
    assert!(ledger.is_new(&id("77777")));

    let stored = Arc::new(Mutex::new(Vec::new()));
    let mut harvester = Harvester::new(
        Box::new(OnePageCollector {
            ids: vec!["55512", "77777", "99999"],
        }),
        Box::new(RecordingSink { stored: stored.clone() }),
        CandidateFilter::new(&config.filters),
        recorder.clone(),
        options(),
    );

    let report = harvester.run(query, 5, ledger).await.unwrap();
    assert_eq!(*stored.lock().unwrap(), vec!["77777".to_string()]);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.skipped_seen, 2);
    assert_eq!(report.stop_reason, StopReason::Exhausted);

    let record = recorder.load(query).await.unwrap();
    assert_eq!(record.total_videos_downloaded, 1);
}

#[tokio::test]
async fn test_hand_written_mapping_values_still_exclude() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let query = "sunset";

    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);
    let dir = recorder.query_dir(query);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("55512_sunset.mp4"), b"clip").await.unwrap();
    tokio::fs::write(
        recorder.metadata_path(query),
        serde_json::json!({
            "original_query": "sunset",
            "clean_query": "sunset",
            "created_at": "2024-05-01 10:00:00",
            "total_videos_downloaded": 40,
            "video_file_mappings": {"55512": "sunset_clip", "44444": "old_clip"}
        })
        .to_string(),
    )
    .await
    .unwrap();
    ExclusionStore::new(config.storage.ignore_list_dir.clone())
        .add(query, vec![id("99999")])
        .await
        .unwrap();

    let ledger = ledger_for(&config, query, None).await;
    // 44444 is known only through the mapping
    assert!(!ledger.is_new(&id("44444")));

    let stored = Arc::new(Mutex::new(Vec::new()));
    let mut harvester = Harvester::new(
        Box::new(OnePageCollector {
            ids: vec!["55512", "77777", "99999", "44444"],
        }),
        Box::new(RecordingSink { stored: stored.clone() }),
        CandidateFilter::default(),
        recorder.clone(),
        options(),
    );
    let report = harvester.run(query, 5, ledger).await.unwrap();
    assert_eq!(*stored.lock().unwrap(), vec!["77777".to_string()]);
    assert_eq!(report.skipped_seen, 3);

    let record = recorder.load(query).await.unwrap();
    assert_eq!(record.total_videos_downloaded, 41);
    assert_eq!(record.created_at, "2024-05-01 10:00:00");
    assert!(!dir.join("query_metadata.json.corrupt").exists());
}

#[tokio::test]
async fn test_record_without_original_query_is_extended() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let query = "night sky";

    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);
    tokio::fs::create_dir_all(recorder.query_dir(query)).await.unwrap();
    tokio::fs::write(
        recorder.metadata_path(query),
        r#"{"clean_query": "night_sky", "total_videos_downloaded": 2, "video_file_mappings": {"31": {"filename": "31_Stars.mp4"}}}"#,
    )
    .await
    .unwrap();

    let ledger = ledger_for(&config, query, None).await;
    assert!(!ledger.is_new(&id("31")));

    let record = recorder.record_session(query, 4, 1).await.unwrap();
    assert_eq!(record.total_videos_downloaded, 3);
    assert_eq!(record.display_query(), Some("night_sky"));
    assert_eq!(record.video_file_mappings[&id("31")].filename, "31_Stars.mp4");
}

#[tokio::test]
async fn test_exclusion_list_rejects_listed_ids() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let store = ExclusionStore::new(config.storage.ignore_list_dir.clone());
    store.add("city skyline", vec![id("111")]).await.unwrap();

    let ledger = ledger_for(&config, "city skyline", None).await;
    assert!(!ledger.is_new(&id("111")));
    assert!(ledger.is_new(&id("222")));
    assert!(ledger.is_new(&id("333")));

    // lists are per query
    let other = ledger_for(&config, "forest", None).await;
    assert!(other.is_new(&id("111")));
}

#[tokio::test]
async fn test_metadata_only_rerun_finds_nothing_new() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let query = "dolly zoom";
    let label = "Camera Moves";
    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);

    let first_sink = JsonExportSink::new(&config.storage.export_dir, label, query).unwrap();
    let mut first = Harvester::new(
        Box::new(OnePageCollector { ids: vec!["1", "2"] }),
        Box::new(first_sink),
        CandidateFilter::default(),
        recorder.clone(),
        options(),
    );
    let report = first.run(query, 10, ledger_for(&config, query, Some(label)).await).await.unwrap();
    assert_eq!(report.accepted, 2);

    let stored = Arc::new(Mutex::new(Vec::new()));
    let mut second = Harvester::new(
        Box::new(OnePageCollector { ids: vec!["1", "2"] }),
        Box::new(RecordingSink { stored: stored.clone() }),
        CandidateFilter::default(),
        recorder.clone(),
        options(),
    );
    let report = second.run(query, 10, ledger_for(&config, query, Some(label)).await).await.unwrap();
    assert_eq!(report.accepted, 0);
    assert_eq!(report.skipped_seen, 2);
    assert!(stored.lock().unwrap().is_empty());

    // a different label is a different namespace
    let ledger = ledger_for(&config, query, Some("Other Label")).await;
    assert!(ledger.is_new(&id("1")));

    let record = recorder.load(query).await.unwrap();
    assert_eq!(record.total_videos_downloaded, 2);
    assert!(record.video_file_mappings.is_empty());
}

#[tokio::test]
async fn test_ledger_build_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let query = "sunset";

    let store = ExclusionStore::new(config.storage.ignore_list_dir.clone());
    store.add(query, vec![id("5"), id("6")]).await.unwrap();
    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);
    let dir = recorder.query_dir(query);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("123456_Sun.mp4"), b"clip").await.unwrap();

    let first = ledger_for(&config, query, None).await;
    let second = ledger_for(&config, query, None).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn test_missing_evidence_yields_empty_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);

    let ledger = tokio_test::block_on(ledger_for(&config, "never searched", None));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_session_record_accumulates_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let config = workspace(&temp_dir);
    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);

    recorder.record_session("Ocean Waves", 10, 4).await.unwrap();
    let record = recorder.record_session("Ocean Waves", 5, 3).await.unwrap();

    assert_eq!(record.original_query, "Ocean Waves");
    assert_eq!(record.clean_query, "ocean_waves");
    assert_eq!(record.total_videos_downloaded, 7);
    let last = record.last_download_session.unwrap();
    assert_eq!(last.requested_count, 5);
    assert_eq!(last.new_downloads, 3);
}
