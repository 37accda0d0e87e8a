use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use walkdir::WalkDir;

use crate::config::{WatchConfig, WatchOptions};
use crate::error::WatchError;

/// Last observed size/mtime of a file that has not been reported yet
#[derive(Debug, Clone, Copy)]
struct Pending {
    size: u64,
    modified: Option<SystemTime>,
    unchanged_since: Instant,
}

/// Polling watcher that reports files once they stop growing.
///
/// The tree is walked every `scan_interval`; in between, only files already
/// waiting for their writes to settle are stat'ed, every `poll_interval`.
pub struct DirectoryWatcher {
    root: PathBuf,
    depth: usize,
    ignore: Vec<Regex>,
    ignore_initial: bool,
    poll_interval: Duration,
    scan_interval: Duration,
    stability_threshold: Duration,
    last_scan: Option<Instant>,
    pending: HashMap<PathBuf, Pending>,
    reported: HashSet<PathBuf>,
}

impl DirectoryWatcher {
    pub fn new(root: impl Into<PathBuf>, options: &WatchOptions) -> Result<Self, WatchError> {
        let ignore = options
            .ignore
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| WatchError::IgnorePattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            depth: options.depth,
            ignore,
            ignore_initial: options.ignore_initial,
            poll_interval: Duration::from_millis(options.poll_interval_ms.max(1)),
            scan_interval: Duration::from_millis(options.scan_interval_ms),
            stability_threshold: Duration::from_millis(options.stability_threshold_ms),
            last_scan: None,
            pending: HashMap::new(),
            reported: HashSet::new(),
        })
    }

    pub fn from_config(cfg: &WatchConfig) -> Result<Self, WatchError> {
        Self::new(cfg.source_dir.clone(), &cfg.watch)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.ignore.iter().any(|re| re.is_match(&text))
    }

    /// One tick. Walks the tree when a scan is due, otherwise rechecks the
    /// pending files. Returns the files that became stable.
    ///
    /// The first scan only records a baseline when `ignore_initial` is set.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<PathBuf>, WatchError> {
        let scan_due = match self.last_scan {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.scan_interval,
        };

        let mut stable = if scan_due {
            self.scan_tree(now)?
        } else {
            self.recheck_pending(now)
        };
        stable.sort();
        Ok(stable)
    }

    fn scan_tree(&mut self, now: Instant) -> Result<Vec<PathBuf>, WatchError> {
        if !self.root.is_dir() {
            return Err(WatchError::RootMissing(self.root.clone()));
        }
        let baseline = self.last_scan.is_none() && self.ignore_initial;
        self.last_scan = Some(now);

        let mut present = HashSet::new();
        let mut stable = Vec::new();

        let walker = WalkDir::new(&self.root)
            .max_depth(self.depth)
            .follow_links(false);
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(WatchError::Io {
                        root: self.root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.is_ignored(path) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let path = path.to_path_buf();
            present.insert(path.clone());

            if self.reported.contains(&path) {
                continue;
            }
            if baseline {
                self.reported.insert(path);
                continue;
            }
            if let Some(path) = self.observe(path, &meta, now) {
                stable.push(path);
            }
        }

        // Forget vanished files so a later file at the same path is reported again.
        self.reported.retain(|p| present.contains(p));
        self.pending.retain(|p, _| present.contains(p));

        if baseline {
            debug!("Ignoring {} file(s) already present", self.reported.len());
        }
        Ok(stable)
    }

    fn recheck_pending(&mut self, now: Instant) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = self.pending.keys().cloned().collect();
        let mut stable = Vec::new();
        for path in paths {
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {
                    if let Some(path) = self.observe(path, &meta, now) {
                        stable.push(path);
                    }
                }
                _ => {
                    debug!("Pending file went away: {}", path.display());
                    self.pending.remove(&path);
                }
            }
        }
        stable
    }

    /// Track one unreported file; returns it once it has been quiet long enough.
    fn observe(&mut self, path: PathBuf, meta: &Metadata, now: Instant) -> Option<PathBuf> {
        let size = meta.len();
        let modified = meta.modified().ok();
        match self.pending.get_mut(&path) {
            Some(p) if p.size == size && p.modified == modified => {
                if now.saturating_duration_since(p.unchanged_since) < self.stability_threshold {
                    return None;
                }
            }
            Some(p) => {
                p.size = size;
                p.modified = modified;
                p.unchanged_since = now;
                return None;
            }
            None => {
                debug!("New file, waiting for writes to settle: {}", path.display());
                self.pending.insert(
                    path,
                    Pending {
                        size,
                        modified,
                        unchanged_since: now,
                    },
                );
                return None;
            }
        }
        self.pending.remove(&path);
        self.reported.insert(path.clone());
        Some(path)
    }

    /// Poll until the receiver goes away (`Ok`) or the root is lost (`Err`).
    pub async fn run(mut self, events: mpsc::Sender<PathBuf>) -> Result<(), WatchError> {
        info!(
            "Watching {} (depth {}, scan every {:?}, settle check every {:?})",
            self.root.display(),
            self.depth,
            self.scan_interval,
            self.poll_interval
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for path in self.poll(Instant::now())? {
                info!("File added: {}", path.display());
                if events.send(path).await.is_err() {
                    debug!("Watch event receiver closed, stopping watcher");
                    return Ok(());
                }
            }
            if events.is_closed() {
                return Ok(());
            }
        }
    }
}
