/// Downloads accepted clips into the per-query directory
use super::{ClipSink, StoredClip};
use crate::collector::{CandidateItem, SessionContext};
use crate::persist::staging_path;
use crate::query::safe_title;
use crate::session::{now_timestamp, ClipMapping, SessionRecorder};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const MAX_TITLE_CHARS: usize = 60;

/// Extension for a clip URL: `.mov`, `.webm`, otherwise `.mp4`
pub fn extension_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".mov") {
        ".mov"
    } else if path.ends_with(".webm") {
        ".webm"
    } else {
        ".mp4"
    }
}

/// `<id>_<safe title><ext>`, so the id can be recovered from the name later
pub fn clip_file_name(item: &CandidateItem) -> String {
    let ext = extension_for_url(&item.url);
    let title = safe_title(&item.title, MAX_TITLE_CHARS);
    if title.is_empty() {
        format!("{}{}", item.id, ext)
    } else {
        format!("{}_{}{}", item.id, title, ext)
    }
}

pub struct DownloadSink {
    session: Arc<SessionContext>,
    recorder: SessionRecorder,
    timeout: Duration,
}

impl DownloadSink {
    pub fn new(session: Arc<SessionContext>, recorder: SessionRecorder, timeout: Duration) -> Self {
        Self {
            session,
            recorder,
            timeout,
        }
    }

    /// Stream `url` into `<target>.part`, then rename into place
    async fn fetch_to(&self, url: &str, target: &Path) -> Result<u64> {
        let part = staging_path(target, ".part");
        match self.stream_into(url, &part).await {
            Ok(bytes) => {
                fs::rename(&part, target)
                    .await
                    .with_context(|| format!("failed to move {} into place", part.display()))?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part).await {
                    debug!("No partial file to clean up at {}: {}", part.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn stream_into(&self, url: &str, part: &Path) -> Result<u64> {
        self.session.note_request();
        let response = self
            .session
            .client()
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("download request failed: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error {}: {}", response.status(), url));
        }

        let mut file = fs::File::create(part)
            .await
            .with_context(|| format!("cannot create {}", part.display()))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("download interrupted")?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl ClipSink for DownloadSink {
    fn name(&self) -> &str {
        "download"
    }

    async fn store(&mut self, query: &str, item: &CandidateItem) -> Result<StoredClip> {
        let dir = self.recorder.query_dir(query);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;

        let file_name = clip_file_name(item);
        let target: PathBuf = dir.join(&file_name);

        let already_present = fs::try_exists(&target).await.unwrap_or(false);
        if already_present {
            info!("📁 Already downloaded: {}", file_name);
        } else {
            info!("⬇️  Downloading {}: {}", item.id, item.title);
            let bytes = self.fetch_to(&item.url, &target).await?;
            info!("✅ Saved {} ({:.1} MB)", file_name, bytes as f64 / (1024.0 * 1024.0));
        }

        let mapping = ClipMapping {
            filename: file_name,
            title: item.title.clone(),
            url: item.url.clone(),
            download_timestamp: now_timestamp(),
            mapping_source: if already_present { "existing_file" } else { "download" }.to_string(),
        };
        // the file is the primary evidence; a missing mapping only loses a backup
        if let Err(e) = self.recorder.record_mapping(query, &item.id, mapping).await {
            warn!("Failed to record mapping for {}: {}", item.id, e);
        }

        Ok(StoredClip {
            location: target,
            already_present,
        })
    }
}
