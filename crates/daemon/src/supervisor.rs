use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::WatchConfig;
use crate::encoding::EncodingProfile;
use crate::engine::TranscodeEngine;
use crate::error::PlanError;
use crate::gate;
use crate::job::TranscodeJob;
use crate::planner::{JobDescriptor, SegmentPlanner};

/// Lifecycle of one descriptor inside a batch.
///
/// `Planned -> (Skipped | Scheduled) -> Running -> (Fulfilled | Rejected)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Planned,
    Skipped,
    Scheduled,
    Running,
    Fulfilled,
    Rejected { reason: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Skipped | JobState::Fulfilled | JobState::Rejected { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Planned => write!(f, "planned"),
            JobState::Skipped => write!(f, "skipped"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Running => write!(f, "running"),
            JobState::Fulfilled => write!(f, "fulfilled"),
            JobState::Rejected { reason } => write!(f, "rejected ({})", reason),
        }
    }
}

/// Settled result of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Position in the planned sequence
    pub index: usize,
    pub output_path: PathBuf,
    pub state: JobState,
}

/// Aggregate of every job spawned for one source file.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub source: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per planned job, in plan order
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&JobState) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.state)).count()
    }

    pub fn fulfilled(&self) -> usize {
        self.count(|s| *s == JobState::Fulfilled)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == JobState::Skipped)
    }

    pub fn failed(&self) -> Vec<&JobOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, JobState::Rejected { .. }))
            .collect()
    }

    /// The single "batch complete" line.
    pub fn summary_line(&self) -> String {
        let failed = self.failed();
        let mut line = format!(
            "Batch {} complete for {}: {} fulfilled, {} skipped, {} failed",
            self.batch_id,
            self.source.display(),
            self.fulfilled(),
            self.skipped(),
            failed.len()
        );
        if !failed.is_empty() {
            let names: Vec<String> = failed.iter().map(|o| display_name(&o.output_path)).collect();
            line.push_str(&format!(" [{}]", names.join(", ")));
        }
        line
    }
}

/// Turns one confirmed source file into a batch of concurrent jobs.
///
/// Jobs of a batch start `index * stagger` after the batch begins and then
/// queue for a slot in a worker pool shared by every batch, so the number of
/// simultaneous engine runs stays bounded however many files arrive.
pub struct BatchSupervisor {
    planner: SegmentPlanner,
    engine: Arc<dyn TranscodeEngine>,
    encoding: EncodingProfile,
    stagger: Duration,
    log_threshold_percent: f64,
    pool: Arc<Semaphore>,
}

impl BatchSupervisor {
    pub fn new(cfg: &WatchConfig, engine: Arc<dyn TranscodeEngine>) -> Result<Self, PlanError> {
        Ok(Self {
            planner: cfg.planner()?,
            engine,
            encoding: cfg.encoding.clone(),
            stagger: cfg.stagger_interval(),
            log_threshold_percent: cfg.progress_log_threshold_percent,
            pool: Arc::new(Semaphore::new(cfg.max_concurrent_jobs.max(1))),
        })
    }

    /// Plan, gate, schedule and await every job for `source`.
    ///
    /// Only planning can fail; job failures are recorded in the report.
    pub async fn run_batch(&self, source: &Path) -> Result<BatchReport, PlanError> {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let begin = Instant::now();

        let descriptors = self.planner.plan(source)?;
        info!(
            "Batch {}: {} job(s) planned for {}",
            batch_id,
            descriptors.len(),
            source.display()
        );

        let mut outcomes = Vec::with_capacity(descriptors.len());
        let mut running: Vec<(usize, PathBuf, JoinHandle<JobState>)> = Vec::new();

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let name = display_name(&descriptor.output_path);

            if gate::is_already_satisfied(&descriptor) {
                info!("⏭️  [{}] output already exists, skipping", name);
                outcomes.push(JobOutcome {
                    index,
                    output_path: descriptor.output_path,
                    state: JobState::Skipped,
                });
                continue;
            }

            let delay = u32::try_from(index)
                .ok()
                .and_then(|i| self.stagger.checked_mul(i));
            let Some((delay, start_at)) = delay.and_then(|d| begin.checked_add(d).map(|at| (d, at))) else {
                error!("❌ [{}] stagger delay for job {} is out of range", name, index);
                outcomes.push(JobOutcome {
                    index,
                    output_path: descriptor.output_path,
                    state: JobState::Rejected {
                        reason: "stagger delay out of range".to_string(),
                    },
                });
                continue;
            };
            debug!("[{}] {} -> {} (start at +{:?})", name, JobState::Planned, JobState::Scheduled, delay);

            let output_path = descriptor.output_path.clone();
            let handle = tokio::spawn(run_scheduled(
                descriptor,
                start_at,
                Arc::clone(&self.pool),
                Arc::clone(&self.engine),
                self.encoding.clone(),
                self.log_threshold_percent,
            ));
            running.push((index, output_path, handle));
        }

        for (index, output_path, handle) in running {
            let state = match handle.await {
                Ok(state) => state,
                Err(e) => {
                    error!("❌ [{}] job task died: {}", display_name(&output_path), e);
                    JobState::Rejected {
                        reason: format!("job task died: {}", e),
                    }
                }
            };
            outcomes.push(JobOutcome {
                index,
                output_path,
                state,
            });
        }
        outcomes.sort_by_key(|o| o.index);

        let report = BatchReport {
            batch_id,
            source: source.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        if report.failed().is_empty() {
            info!("{}", report.summary_line());
        } else {
            warn!("{}", report.summary_line());
        }

        Ok(report)
    }
}

async fn run_scheduled(
    descriptor: JobDescriptor,
    start_at: Instant,
    pool: Arc<Semaphore>,
    engine: Arc<dyn TranscodeEngine>,
    encoding: EncodingProfile,
    log_threshold_percent: f64,
) -> JobState {
    let name = display_name(&descriptor.output_path);

    tokio::time::sleep_until(start_at).await;

    let _permit = match pool.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            error!("❌ [{}] worker pool closed before the job could start", name);
            return JobState::Rejected {
                reason: "worker pool closed".to_string(),
            };
        }
    };
    debug!("[{}] {} -> {}", name, JobState::Scheduled, JobState::Running);

    let job = TranscodeJob::new(descriptor, &encoding, log_threshold_percent);
    match job.run(engine.as_ref()).await {
        Ok(output) => {
            info!("✅ [{}] finished: {}", name, output.display());
            JobState::Fulfilled
        }
        Err(e) => {
            error!("❌ [{}] failed: {}", name, e);
            JobState::Rejected { reason: e.to_string() }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
