use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stock_clip_harvester::config::Config;
use stock_clip_harvester::ranking::{export_ranked, top_k, ClipRanker, FfmpegFrameSampler, RemoteEmbedder};
use stock_clip_harvester::session::SessionRecorder;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "clip-filter")]
#[command(about = "Rank downloaded clips by similarity to their query and keep the best")]
struct Cli {
    /// Directory holding one subdirectory per query
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Number of clips to keep
    #[arg(long)]
    top_k: Option<usize>,

    /// Rank against this text instead of each directory's recorded query
    #[arg(long)]
    query: Option<String>,

    /// Where ranked copies are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Frames sampled per clip
    #[arg(long)]
    frames: Option<usize>,

    /// Embedding server base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let source_dir = cli.source_dir.unwrap_or_else(|| config.storage.download_dir.clone());
    let output_dir = cli.output_dir.unwrap_or_else(|| config.ranking.output_dir.clone());
    let keep = cli.top_k.unwrap_or(config.ranking.top_k);
    let frames = cli.frames.unwrap_or(config.ranking.frames_per_clip);
    let endpoint = cli.endpoint.unwrap_or_else(|| config.ranking.endpoint.clone());

    info!("🎬 Clip filter starting");
    info!("📁 Source: {}", source_dir.display());
    info!("📂 Output: {}", output_dir.display());
    info!("🧠 Embedding server: {} ({} frames per clip)", endpoint, frames);

    let ranker = ClipRanker::new(
        Box::new(RemoteEmbedder::new(&endpoint, config.ranking.timeout_seconds)?),
        Box::new(FfmpegFrameSampler::new()),
        SessionRecorder::new(source_dir.clone(), &config.storage.video_extensions),
        frames,
    );

    let ranked = ranker
        .rank_directory(&source_dir, cli.query.as_deref(), top_k(keep))
        .await?;

    if ranked.is_empty() {
        warn!("⚠️ No clips to rank under {}", source_dir.display());
        return Ok(());
    }

    info!("🏆 Top {} clips:", ranked.len());
    for (index, clip) in ranked.iter().enumerate() {
        info!(
            "  {:2}. {:.4}  {} ({})",
            index + 1,
            clip.similarity,
            clip.path.display(),
            clip.query
        );
    }

    let results = export_ranked(&ranked, &output_dir).await?;
    info!("✅ Done, results in {}", results.display());
    Ok(())
}
