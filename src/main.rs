use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use stock_clip_harvester::config::Config;
use stock_clip_harvester::ledger::{evidence_for_query, Ledger};
use stock_clip_harvester::sink::ClipSink;
use stock_clip_harvester::{
    CandidateFilter, DownloadSink, HarvestOptions, Harvester, JsonExportSink, SessionContext, SessionRecorder,
    StockSiteCollector,
};

fn cli() -> Command {
    Command::new("stock-scraper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Collect new, unique stock video clips for a search query")
        .arg(
            Arg::new("query")
                .short('q')
                .long("query")
                .value_name("TEXT")
                .help("Search query")
                .required(true),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .long("count")
                .value_name("NUM")
                .help("Number of new clips to collect")
                .value_parser(clap::value_parser!(u64))
                .default_value("10"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Download directory"),
        )
        .arg(
            Arg::new("delay")
                .short('d')
                .long("delay")
                .value_name("SECONDS")
                .help("Pause between requests")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("auth")
                .long("auth")
                .help("Use a stored session cookie")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json-output")
                .long("json-output")
                .help("Write clip metadata to a labelled JSON file instead of downloading")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("intended-label")
                .long("intended-label")
                .value_name("LABEL")
                .help("Label the exported clips are filed under (with --json-output)"),
        )
        .arg(
            Arg::new("max-duration")
                .long("max-duration")
                .value_name("SECONDS")
                .help("Skip clips longer than this")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("min-duration")
                .long("min-duration")
                .value_name("SECONDS")
                .help("Skip clips shorter than this")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("max-size-mb")
                .long("max-size-mb")
                .value_name("MB")
                .help("Skip clips larger than this")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("exclude-title")
                .long("exclude-title")
                .value_name("TEXT")
                .help("Skip clips whose title contains this (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-pages")
                .long("max-pages")
                .value_name("NUM")
                .help("Maximum number of result pages to scan")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(path: Option<&String>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(std::path::Path::new(path)),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let mut config = load_config(matches.get_one::<String>("config"));

    let filter = if verbose {
        "stock_clip_harvester=debug,stock_scraper=debug,info".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("stock_clip_harvester={},warn", config.logging.level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let query = matches
        .get_one::<String>("query")
        .cloned()
        .ok_or_else(|| anyhow!("--query is required"))?;
    let count = matches.get_one::<u64>("count").copied().unwrap_or(10);
    let json_output = matches.get_flag("json-output");
    let label = matches.get_one::<String>("intended-label").cloned();

    if let Some(dir) = matches.get_one::<String>("output") {
        config.storage.download_dir = PathBuf::from(dir);
    }
    if let Some(delay) = matches.get_one::<f64>("delay") {
        config.scraper.delay_seconds = *delay;
    }
    if let Some(pages) = matches.get_one::<u32>("max-pages") {
        config.scraper.max_pages = *pages;
    }
    if matches.get_flag("auth") {
        config.auth.enabled = true;
    }
    if let Some(max) = matches.get_one::<f64>("max-duration") {
        config.filters.max_duration_seconds = Some(*max);
    }
    if let Some(min) = matches.get_one::<f64>("min-duration") {
        config.filters.min_duration_seconds = Some(*min);
    }
    if let Some(size) = matches.get_one::<f64>("max-size-mb") {
        config.filters.max_size_mb = Some(*size);
    }
    if let Some(patterns) = matches.get_many::<String>("exclude-title") {
        config.filters.exclude_title_patterns.extend(patterns.cloned());
    }
    config.validate()?;

    if json_output && label.is_none() {
        error!("--json-output requires --intended-label");
        return Err(anyhow!("--json-output requires --intended-label"));
    }

    info!("🚀 Stock clip harvester starting...");
    info!("{}", config.summary());

    let session = Arc::new(SessionContext::acquire(&config).await?);
    let recorder = SessionRecorder::new(config.storage.download_dir.clone(), &config.storage.video_extensions);

    let sources = evidence_for_query(&config, &query, label.as_deref());
    let ledger = Ledger::build(&query, &sources).await;

    let sink: Box<dyn ClipSink> = match (json_output, label.as_deref()) {
        (true, Some(label)) => {
            let sink = JsonExportSink::new(&config.storage.export_dir, label, &query)?;
            info!("📝 Metadata-only mode, writing {}", sink.path().display());
            Box::new(sink)
        }
        _ => Box::new(DownloadSink::new(
            session.clone(),
            recorder.clone(),
            std::time::Duration::from_secs(config.scraper.download_timeout_seconds),
        )),
    };

    let collector = StockSiteCollector::new(session.clone(), &config.scraper);
    let mut harvester = Harvester::new(
        Box::new(collector),
        sink,
        CandidateFilter::new(&config.filters),
        recorder,
        HarvestOptions::from_config(&config),
    );

    let start_time = std::time::Instant::now();
    let outcome = tokio::select! {
        result = harvester.run(&query, count, ledger) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    drop(harvester);

    match outcome {
        Some(Ok(report)) => {
            info!("🎉 Finished in {:.2}s", start_time.elapsed().as_secs_f64());
            info!("{}", report.summary());
        }
        Some(Err(e)) => {
            error!("❌ Harvest failed: {:#}", e);
            return Err(e);
        }
        None => {
            warn!("⚠️  Interrupted; files written so far are kept");
        }
    }

    if let Ok(session) = Arc::try_unwrap(session) {
        session.release();
    }
    Ok(())
}
