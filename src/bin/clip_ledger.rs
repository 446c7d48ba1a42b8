use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stock_clip_harvester::config::Config;
use stock_clip_harvester::exclusion::ExclusionStore;
use stock_clip_harvester::ledger::ContentId;
use stock_clip_harvester::query::clean_query;
use stock_clip_harvester::session::{QueryDirectorySummary, SessionRecorder};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "clip-ledger")]
#[command(about = "Inspect and maintain ignore lists and session records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the download directory
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Override the ignore list directory
    #[arg(long)]
    ignore_list_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many ids a query's ignore list holds
    Status {
        /// Search query
        query: String,
        /// Also print every id
        #[arg(long)]
        list: bool,
    },
    /// Add ids to a query's ignore list
    Add {
        query: String,
        /// Content ids to ignore
        #[arg(required = true)]
        ids: Vec<String>,
        /// Note stored with each id
        #[arg(long)]
        note: Option<String>,
    },
    /// Remove ids from a query's ignore list
    Remove {
        query: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Empty a query's ignore list
    Clear { query: String },
    /// Ignore every clip already recorded in a query_metadata.json
    Import {
        /// Path to a query_metadata.json file
        metadata: PathBuf,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show session records for one query or for every query directory
    Show {
        query: Option<String>,
        /// Print each id-to-file mapping
        #[arg(long)]
        mappings: bool,
    },
    /// Add missing id mappings from file names, or by title from JSON exports
    Backfill {
        /// Query directory; every query directory when omitted
        dir: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_ids(raw: &[String]) -> Vec<ContentId> {
    raw.iter()
        .filter_map(|id| {
            let parsed = ContentId::parse(id);
            if parsed.is_none() {
                warn!("⚠️ Ignoring blank id");
            }
            parsed
        })
        .collect()
}

fn print_summary(summary: &QueryDirectorySummary, mappings: bool) {
    let name = summary
        .directory
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    info!("📁 {}", name);
    let Some(record) = &summary.record else {
        info!("  No session record; {} video files", summary.video_files);
        return;
    };

    info!("  Query: '{}' ({})", record.original_query, record.clean_query);
    info!("  Created: {}  Last updated: {}", record.created_at, record.last_updated);
    info!(
        "  Videos recorded: {}  Files on disk: {}  Mapped: {}",
        record.total_videos_downloaded,
        summary.video_files,
        record.video_file_mappings.len()
    );
    if let Some(last) = &record.last_download_session {
        info!(
            "  Last session: {} requested, {} new at {}",
            last.requested_count, last.new_downloads, last.session_timestamp
        );
    }
    if mappings {
        for (id, mapping) in &record.video_file_mappings {
            info!("    {} -> {} ({})", id, mapping.filename, mapping.mapping_source);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.download_dir {
        config.storage.download_dir = dir;
    }
    if let Some(dir) = cli.ignore_list_dir {
        config.storage.ignore_list_dir = dir;
    }

    let store = ExclusionStore::new(config.storage.ignore_list_dir.clone());
    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);

    match cli.command {
        Commands::Status { query, list } => {
            let excluded = store.load(&query).await?;
            info!("📊 Ignore list for '{}' ({})", query, store.path_for(&query).display());
            info!("  Ignored ids: {}", excluded.len());
            if list {
                for id in excluded.ids() {
                    match excluded.note(id) {
                        Some(note) => info!("    {} ({})", id, note),
                        None => info!("    {}", id),
                    }
                }
            }
        }

        Commands::Add { query, ids, note } => {
            let ids = parse_ids(&ids);
            let added = match note {
                Some(note) => {
                    let mut added = 0;
                    for id in ids {
                        if store.add_with_note(&query, id, &note).await? {
                            added += 1;
                        }
                    }
                    added
                }
                None => store.add(&query, ids).await?,
            };
            info!("✅ Added {} new ids; list now holds {}", added, store.status(&query).await?);
        }

        Commands::Remove { query, ids } => {
            let removed = store.remove(&query, parse_ids(&ids)).await?;
            if removed > 0 {
                info!("✅ Removed {} ids; list now holds {}", removed, store.status(&query).await?);
            } else {
                warn!("⚠️ None of those ids were on the '{}' list", clean_query(&query));
            }
        }

        Commands::Clear { query } => {
            let count = store.clear(&query).await?;
            info!("🧹 Cleared {} ids from '{}'", count, clean_query(&query));
        }

        Commands::Import { metadata, dry_run } => {
            let report = store.import_from_metadata(&metadata, dry_run).await?;
            info!("📋 Query: '{}' -> {}", report.original_query, report.list_path.display());
            info!("  Recorded ids: {}", report.found);
            info!("  Already ignored: {}", report.already_present);
            if report.dry_run {
                info!("  Would add: {}", report.found - report.already_present);
            } else {
                info!("  Added: {}", report.added);
            }
        }

        Commands::Show { query, mappings } => {
            let summaries = match query {
                Some(query) => vec![recorder.summarize_dir(&recorder.query_dir(&query)).await],
                None => recorder.list_all().await?,
            };

            if summaries.is_empty() {
                info!("📭 No session records under {}", config.storage.download_dir.display());
                return Ok(());
            }
            for summary in &summaries {
                print_summary(summary, mappings);
            }
        }

        Commands::Backfill { dir, dry_run } => {
            let dirs = match dir {
                Some(dir) => vec![dir],
                None => recorder
                    .list_all()
                    .await?
                    .into_iter()
                    .map(|summary| summary.directory)
                    .collect(),
            };

            let mut total = 0;
            for dir in dirs {
                let export_dirs = [config.storage.export_dir.clone(), dir.clone()];
                let added = recorder.backfill_mappings(&dir, &export_dirs, dry_run).await?;
                for (file, id) in &added {
                    info!("  🔗 {} -> {}", id, file);
                }
                total += added.len();
            }

            if dry_run {
                info!("🔍 Would add {} mappings", total);
            } else {
                info!("✅ Added {} mappings", total);
            }
        }
    }

    Ok(())
}
