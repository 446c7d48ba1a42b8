/// Post-hoc ranking of downloaded clips against their query text
///
/// Each clip is reduced to the mean of its L2-normalised frame embeddings
/// and scored by cosine similarity with the embedded query.

pub mod embedder;
pub mod frames;

pub use embedder::{Embedder, RemoteEmbedder};
pub use frames::{FfmpegFrameSampler, FrameSampler};

use crate::persist::write_json_atomic;
use crate::session::{now_timestamp, SessionRecorder, METADATA_FILE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const RESULTS_FILE: &str = "filtering_results.json";

/// Cosine similarity between two vectors. Returns 0.0 for empty, mismatched
/// or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn normalized(v: &[f32]) -> Option<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

/// Mean of the L2-normalised vectors. Zero-norm vectors and vectors whose
/// dimension differs from the first usable one are ignored.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let usable: Vec<Vec<f32>> = vectors.iter().filter_map(|v| normalized(v)).collect();
    let dim = usable.first()?.len();
    let same_dim: Vec<&Vec<f32>> = usable.iter().filter(|v| v.len() == dim).collect();

    let mut mean = vec![0.0f32; dim];
    for v in &same_dim {
        for (acc, x) in mean.iter_mut().zip(v.iter()) {
            *acc += x;
        }
    }
    let count = same_dim.len() as f32;
    mean.iter_mut().for_each(|x| *x /= count);
    Some(mean)
}

/// One scored clip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedClip {
    pub path: PathBuf,
    pub similarity: f64,
    pub query: String,
    pub source_directory: String,
}

/// Keep the `k` best clips
pub fn top_k(k: usize) -> impl Fn(Vec<RankedClip>) -> Vec<RankedClip> {
    move |mut ranked| {
        ranked.truncate(k);
        ranked
    }
}

/// Keep every clip scoring at least `threshold`
pub fn above_threshold(threshold: f64) -> impl Fn(Vec<RankedClip>) -> Vec<RankedClip> {
    move |ranked| ranked.into_iter().filter(|clip| clip.similarity >= threshold).collect()
}

#[derive(Debug, Serialize)]
struct ResultEntry {
    rank: usize,
    original_path: String,
    output_filename: String,
    similarity_score: f64,
    source_directory: String,
}

#[derive(Debug, Serialize)]
struct ResultsFile {
    filtering_timestamp: String,
    total_videos_filtered: usize,
    videos: Vec<ResultEntry>,
}

/// `rank_{NN}_sim_{score}_{stem}{ext}`
pub fn ranked_file_name(rank: usize, clip: &RankedClip) -> String {
    let stem = clip
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = clip
        .path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("rank_{:02}_sim_{:.4}_{}{}", rank, clip.similarity, stem, ext)
}

pub struct ClipRanker {
    embedder: Box<dyn Embedder>,
    sampler: Box<dyn FrameSampler>,
    recorder: SessionRecorder,
    frames_per_clip: usize,
}

impl ClipRanker {
    pub fn new(
        embedder: Box<dyn Embedder>,
        sampler: Box<dyn FrameSampler>,
        recorder: SessionRecorder,
        frames_per_clip: usize,
    ) -> Self {
        Self {
            embedder,
            sampler,
            recorder,
            frames_per_clip,
        }
    }

    /// Clip embedding, or `None` when no frame could be embedded
    pub async fn embed_clip(&self, video: &Path) -> Result<Option<Vec<f32>>> {
        let scratch = TempDir::new()?;
        let frames = self
            .sampler
            .sample(video, self.frames_per_clip, scratch.path())
            .await?;

        let mut embeddings = Vec::with_capacity(frames.len());
        for frame in &frames {
            match self.embedder.embed_image(frame).await {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => warn!("Skipping frame {}: {}", frame.display(), e),
            }
        }

        debug!("Embedded {}/{} frames of {}", embeddings.len(), frames.len(), video.display());
        Ok(mean_embedding(&embeddings))
    }

    /// Score a clip against an already embedded query. Clips that cannot
    /// be sampled score 0.0.
    pub async fn score_clip(&self, video: &Path, query_embedding: &[f32]) -> f64 {
        match self.embed_clip(video).await {
            Ok(Some(embedding)) => cosine_similarity(&embedding, query_embedding),
            Ok(None) => {
                warn!("⚠️  No usable frames in {}", video.display());
                0.0
            }
            Err(e) => {
                warn!("⚠️  Could not sample {}: {}", video.display(), e);
                0.0
            }
        }
    }

    /// Rank every clip in each query subdirectory of `source_dir`.
    ///
    /// The query is `query` when given, else the directory's recorded
    /// original query, else its clean query; directories without one are
    /// skipped. Results are sorted by similarity (best first) and then
    /// handed to `select`.
    pub async fn rank_directory<F>(&self, source_dir: &Path, query: Option<&str>, select: F) -> Result<Vec<RankedClip>>
    where
        F: Fn(Vec<RankedClip>) -> Vec<RankedClip>,
    {
        info!("🔍 Ranking clips in: {}", source_dir.display());
        if !source_dir.is_dir() {
            anyhow::bail!("Source directory does not exist: {}", source_dir.display());
        }

        let mut subdirs: Vec<PathBuf> = WalkDir::new(source_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect();
        subdirs.sort();

        let mut query_embeddings: HashMap<String, Vec<f32>> = HashMap::new();
        let mut ranked = Vec::new();

        for dir in subdirs {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let search_query = match query {
                Some(q) if !q.trim().is_empty() => q.to_string(),
                _ => match SessionRecorder::read_record(&dir.join(METADATA_FILE)).await {
                    Ok(record) => match record.display_query() {
                        Some(q) => q.to_string(),
                        None => {
                            warn!("⚠️  No query found for {}, skipping", dir_name);
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!("⚠️  No query found for {} ({}), skipping", dir_name, e);
                        continue;
                    }
                },
            };

            let videos = self.recorder.video_files(&dir);
            if videos.is_empty() {
                warn!("⚠️  No video files found in {}", dir_name);
                continue;
            }
            info!("📁 {}: {} clips for '{}'", dir_name, videos.len(), search_query);

            if !query_embeddings.contains_key(&search_query) {
                let embedding = self
                    .embedder
                    .embed_text(&search_query)
                    .await
                    .with_context(|| format!("failed to embed query '{}'", search_query))?;
                query_embeddings.insert(search_query.clone(), embedding);
            }
            let Some(query_embedding) = query_embeddings.get(&search_query) else {
                continue;
            };

            for video in videos {
                let similarity = self.score_clip(&video, query_embedding).await;
                debug!("  {}: {:.4}", video.display(), similarity);
                ranked.push(RankedClip {
                    path: video,
                    similarity,
                    query: search_query.clone(),
                    source_directory: dir_name.clone(),
                });
            }
        }

        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!("📊 Scored {} clips", ranked.len());
        Ok(select(ranked))
    }
}

/// Copy ranked clips into `out_dir` under rank-prefixed names and write
/// `filtering_results.json`. Copy failures are logged and left out of the
/// results file.
pub async fn export_ranked(ranked: &[RankedClip], out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("cannot create {}", out_dir.display()))?;
    info!("📋 Copying {} clips to: {}", ranked.len(), out_dir.display());

    let mut videos = Vec::with_capacity(ranked.len());
    for (index, clip) in ranked.iter().enumerate() {
        let rank = index + 1;
        let name = ranked_file_name(rank, clip);
        match fs::copy(&clip.path, out_dir.join(&name)).await {
            Ok(_) => {
                info!("  ✅ Copied: {}", name);
                videos.push(ResultEntry {
                    rank,
                    original_path: clip.path.display().to_string(),
                    output_filename: name,
                    similarity_score: clip.similarity,
                    source_directory: clip.source_directory.clone(),
                });
            }
            Err(e) => warn!("  ❌ Failed to copy {}: {}", clip.path.display(), e),
        }
    }

    let results = ResultsFile {
        filtering_timestamp: now_timestamp(),
        total_videos_filtered: videos.len(),
        videos,
    };
    let results_path = out_dir.join(RESULTS_FILE);
    write_json_atomic(&results_path, &results).await?;
    info!("📊 Results saved to: {}", results_path.display());
    Ok(results_path)
}
