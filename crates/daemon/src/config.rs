use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::encoding::EncodingProfile;
use crate::planner::{ClipSpec, SegmentPlanner};

/// Longest accepted delay between two job starts of one batch (one day)
const MAX_STAGGER_SECS: f64 = 86_400.0;

/// Options for the directory watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Maximum directory depth below the source dir
    pub depth: usize,
    /// Regular expressions; matching paths are never reported
    pub ignore: Vec<String>,
    /// Do not report files that already exist when watching starts
    pub ignore_initial: bool,
    /// How often files waiting to settle are re-checked, in milliseconds
    pub poll_interval_ms: u64,
    /// How often the whole tree is walked for new files, in milliseconds
    pub scan_interval_ms: u64,
    /// How long size and mtime must stay unchanged before a file is reported
    pub stability_threshold_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            depth: 99,
            ignore: Vec::new(),
            ignore_initial: true,
            poll_interval_ms: 100,
            scan_interval_ms: 1000,
            stability_threshold_ms: 2000,
        }
    }
}

/// Configuration for the clip watcher daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory watched for new media files
    pub source_dir: PathBuf,
    /// Directory that receives the clips; never watched for input
    pub target_dir: PathBuf,
    /// Media extension to react to, matched case-insensitively (with or without the dot)
    pub extension: String,
    /// Clips produced for every accepted file
    pub clip_specs: Vec<ClipSpec>,
    /// Delay between the starts of consecutive jobs of one batch, in seconds
    pub stagger_interval_secs: f64,
    /// Minimum progress advance, in percentage points, between two progress log lines
    pub progress_log_threshold_percent: f64,
    /// Upper bound on engine invocations running at once, across all batches
    pub max_concurrent_jobs: usize,
    /// Ask the operator before converting each file
    pub require_confirmation: bool,
    pub watch: WatchOptions,
    pub encoding: EncodingProfile,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl WatchConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            source_dir: PathBuf::from("/srv/share"),
            target_dir: PathBuf::from("/srv/share/converted"),
            extension: "mp4".to_string(),
            clip_specs: vec![ClipSpec::full()],
            stagger_interval_secs: 1.0,
            progress_log_threshold_percent: 5.0,
            max_concurrent_jobs: 2,
            require_confirmation: true,
            watch: WatchOptions::default(),
            encoding: EncodingProfile::default(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }

    /// Load configuration from a file, or return defaults if path is None
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                config = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
            } else {
                config = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every setting that would otherwise fail later, at run time
    pub fn validate(&self) -> Result<()> {
        self.planner().context("Invalid clip specification")?;

        if self.clip_specs.is_empty() {
            anyhow::bail!("No clip specs configured");
        }
        if self.normalized_extension().is_empty() {
            anyhow::bail!("Media extension must not be empty");
        }
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be at least 1");
        }
        if !(self.progress_log_threshold_percent > 0.0 && self.progress_log_threshold_percent <= 100.0) {
            anyhow::bail!(
                "progress_log_threshold_percent must be in (0, 100], got {}",
                self.progress_log_threshold_percent
            );
        }
        if !(self.stagger_interval_secs >= 0.0 && self.stagger_interval_secs <= MAX_STAGGER_SECS) {
            anyhow::bail!(
                "stagger_interval_secs must be between 0 and {}, got {}",
                MAX_STAGGER_SECS,
                self.stagger_interval_secs
            );
        }
        self.check_directories()?;
        for pattern in &self.watch.ignore {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
        }
        Ok(())
    }

    /// The source must not live inside the target directory: every event
    /// would be dropped as one of our own outputs.
    ///
    /// Purely lexical; call again once both paths are canonical.
    pub fn check_directories(&self) -> Result<()> {
        if self.source_dir.starts_with(&self.target_dir) {
            anyhow::bail!(
                "source_dir {} must not be the target_dir {} or inside it",
                self.source_dir.display(),
                self.target_dir.display()
            );
        }
        Ok(())
    }

    /// Delay between consecutive job starts of a batch
    pub fn stagger_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.stagger_interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Build the planner for the configured clip list
    pub fn planner(&self) -> Result<SegmentPlanner, crate::error::PlanError> {
        SegmentPlanner::new(&self.clip_specs, &self.target_dir)
    }

    /// Extension without a leading dot, lower-cased
    pub fn normalized_extension(&self) -> String {
        self.extension.trim().trim_start_matches('.').to_lowercase()
    }
}
