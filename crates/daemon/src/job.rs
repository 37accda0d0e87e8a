use std::path::PathBuf;

use log::{debug, info};
use tokio::sync::mpsc;

use crate::encoding::EncodingProfile;
use crate::engine::{EngineEvent, EngineProgress, EngineRequest, TranscodeEngine};
use crate::error::EngineError;
use crate::planner::JobDescriptor;

/// Percent of a segment covered by an absolute source timemark.
pub fn segment_percent(timemark: f64, start_seconds: u32, duration_seconds: u32) -> f64 {
    if duration_seconds == 0 {
        return 100.0;
    }
    let elapsed = timemark - f64::from(start_seconds);
    (elapsed / f64::from(duration_seconds) * 100.0).clamp(0.0, 100.0)
}

/// Log throttle for one job's progress.
///
/// Only ever moves forward. A value is reported when it is at least
/// `threshold` points past the last reported one, or when 100 is first hit.
#[derive(Debug, Clone)]
pub struct ProgressState {
    last_reported_percent: f64,
    threshold: f64,
}

impl ProgressState {
    pub fn new(threshold: f64) -> Self {
        Self {
            last_reported_percent: 0.0,
            threshold,
        }
    }

    /// Feed a new reading; returns the value to log, if any.
    pub fn observe(&mut self, percent: f64) -> Option<f64> {
        if !percent.is_finite() {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);

        let finished = percent >= 100.0 && self.last_reported_percent < 100.0;
        if finished || percent - self.last_reported_percent >= self.threshold {
            self.last_reported_percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}

/// One engine invocation for one descriptor.
pub struct TranscodeJob {
    descriptor: JobDescriptor,
    profile: EncodingProfile,
    progress: ProgressState,
    name: String,
}

impl TranscodeJob {
    /// Bind a descriptor to the global profile, applying any per-clip override.
    pub fn new(descriptor: JobDescriptor, global: &EncodingProfile, log_threshold_percent: f64) -> Self {
        let profile = global.with_override(descriptor.encoding.as_ref());
        let name = descriptor
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| descriptor.output_path.display().to_string());

        Self {
            descriptor,
            profile,
            progress: ProgressState::new(log_threshold_percent),
            name,
        }
    }

    pub fn request(&self) -> EngineRequest {
        EngineRequest {
            source: self.descriptor.source_path.clone(),
            output: self.descriptor.output_path.clone(),
            start_seconds: self.descriptor.start_seconds,
            duration_seconds: self.descriptor.duration_seconds,
            profile: self.profile.clone(),
        }
    }

    /// Run the engine to its single outcome. Never retries.
    pub async fn run(mut self, engine: &dyn TranscodeEngine) -> Result<PathBuf, EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = self.request();

        let engine_run = engine.transcode(request, tx);
        let handle_events = async {
            while let Some(event) = rx.recv().await {
                self.handle_event(event);
            }
        };

        let (result, ()) = tokio::join!(engine_run, handle_events);
        result.map(|()| self.descriptor.output_path)
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started { command_line } => {
                info!("[{}] started ({})", self.name, self.descriptor.label());
                debug!("[{}] command: {}", self.name, command_line);
            }
            EngineEvent::Progress(progress) => {
                if let Some(percent) = self.normalize(&progress) {
                    if let Some(logged) = self.progress.observe(percent) {
                        info!("[{}] progress: {:.2}%", self.name, logged);
                    }
                }
            }
        }
    }

    /// Full-video jobs trust the engine's percent; segment jobs rebase the
    /// absolute timemark onto their own window.
    fn normalize(&self, progress: &EngineProgress) -> Option<f64> {
        match (self.descriptor.start_seconds, self.descriptor.duration_seconds) {
            (Some(start), Some(duration)) if !self.descriptor.is_full => progress
                .timemark
                .map(|t| segment_percent(t, start, duration)),
            _ => progress.percent,
        }
    }
}
