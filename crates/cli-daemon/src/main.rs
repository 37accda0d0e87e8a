use anyhow::{Context, Result};
use clap::Parser;
use clipwatch::{
    config::WatchConfig,
    dispatcher::Dispatcher,
    engine::TranscodeEngine,
    ffmpeg::FfmpegEngine,
    lifecycle::{self, Exit},
    prompt::PromptRouter,
    supervisor::BatchSupervisor,
    watcher::DirectoryWatcher,
};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;

/// Watch a directory for new videos and cut them into clips with ffmpeg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Convert every new file without asking
    #[arg(short = 'y', long)]
    assume_yes: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let exit = runtime.block_on(run(args));
    // A pending stdin read would otherwise hold up runtime shutdown.
    runtime.shutdown_background();

    let exit = exit?;
    if exit.code() != 0 {
        std::process::exit(exit.code());
    }
    Ok(())
}

async fn run(args: Args) -> Result<Exit> {
    let mut cfg = WatchConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.assume_yes {
        cfg.require_confirmation = false;
    }

    fs::create_dir_all(&cfg.target_dir)
        .with_context(|| format!("Failed to create target directory: {}", cfg.target_dir.display()))?;
    cfg.target_dir = fs::canonicalize(&cfg.target_dir)
        .with_context(|| format!("Failed to resolve target directory: {}", cfg.target_dir.display()))?;
    cfg.source_dir = fs::canonicalize(&cfg.source_dir)
        .with_context(|| format!("Source directory is not accessible: {}", cfg.source_dir.display()))?;
    // Symlinks and relative paths can hide a source inside the target until now.
    cfg.check_directories().context("Invalid directory layout")?;

    info!("Clip watcher starting");
    info!("Configuration loaded:");
    info!("  Source dir: {}", cfg.source_dir.display());
    info!("  Target dir: {}", cfg.target_dir.display());
    info!("  Extension: .{}", cfg.normalized_extension());
    info!("  Clips per file: {}", cfg.clip_specs.len());
    info!("  Stagger: {}s, max concurrent jobs: {}", cfg.stagger_interval_secs, cfg.max_concurrent_jobs);
    info!(
        "  Encoding: {} crf {} ({}), {} {} Hz",
        cfg.encoding.video_codec,
        cfg.encoding.crf,
        cfg.encoding.preset,
        cfg.encoding.audio_codec,
        cfg.encoding.audio_sample_rate
    );
    if cfg.require_confirmation {
        info!("  Confirmation: answer 'y' or '<id> y' to the [#id] questions");
    } else {
        warn!("  Confirmation disabled: every new file is converted");
    }

    lifecycle::install_panic_hook();

    let engine: Arc<dyn TranscodeEngine> = Arc::new(FfmpegEngine::from_config(&cfg));
    let supervisor = BatchSupervisor::new(&cfg, engine).context("Invalid clip specification")?;
    let prompter = PromptRouter::spawn(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    let dispatcher = Arc::new(Dispatcher::new(
        &cfg,
        Arc::new(prompter.clone()),
        Arc::new(supervisor),
    ));
    let watcher = DirectoryWatcher::from_config(&cfg).context("Failed to set up directory watcher")?;

    let (events_tx, events_rx) = mpsc::channel(64);
    let watch_task = tokio::spawn(watcher.run(events_tx));
    let dispatch_task = tokio::spawn(dispatcher.run(events_rx));

    info!("Waiting for new files...");
    let exit = lifecycle::supervise(watch_task, lifecycle::shutdown_signal()).await;

    // Abrupt shutdown: in-flight jobs are dropped and their ffmpeg children killed.
    prompter.close();
    dispatch_task.abort();
    info!("Clip watcher stopped");

    Ok(exit)
}
