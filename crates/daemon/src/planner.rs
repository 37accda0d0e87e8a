use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoding::EncodingOverride;
use crate::error::PlanError;
use crate::timecode::{format_hms, parse_hms};

/// One desired output clip, as written in the configuration.
///
/// Either `{ "full": true }` for a whole-file re-encode, or a
/// `start_time`/`end_time` pair in `HH:MM:SS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSpec {
    #[serde(default)]
    pub full: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingOverride>,
}

impl ClipSpec {
    pub fn full() -> Self {
        Self {
            full: true,
            ..Default::default()
        }
    }

    pub fn range(start: &str, end: &str) -> Self {
        Self {
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            ..Default::default()
        }
    }
}

/// Normalized unit of work derived from one clip spec and one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub is_full: bool,
    pub start_seconds: Option<u32>,
    pub duration_seconds: Option<u32>,
    pub encoding: Option<EncodingOverride>,
}

impl JobDescriptor {
    /// Short human label used in log lines.
    pub fn label(&self) -> String {
        match (self.start_seconds, self.duration_seconds) {
            (Some(start), Some(duration)) if !self.is_full => {
                format!("{}-{}", format_hms(start), format_hms(start + duration))
            }
            _ => "full video".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClipWindow {
    Full,
    Segment { start: u32, end: u32 },
}

#[derive(Debug, Clone)]
struct PlannedClip {
    window: ClipWindow,
    encoding: Option<EncodingOverride>,
}

/// Validated clip list bound to an output directory.
///
/// Construction does all validation, so a planner that exists can always
/// expand a source file (barring a nameless path).
#[derive(Debug, Clone)]
pub struct SegmentPlanner {
    clips: Vec<PlannedClip>,
    target_dir: PathBuf,
}

impl SegmentPlanner {
    pub fn new(specs: &[ClipSpec], target_dir: impl Into<PathBuf>) -> Result<Self, PlanError> {
        let clips = specs
            .iter()
            .map(validate_spec)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            clips,
            target_dir: target_dir.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Expand a source file into one descriptor per clip, in clip order.
    pub fn plan(&self, source: &Path) -> Result<Vec<JobDescriptor>, PlanError> {
        let stem = source
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PlanError::InvalidSourcePath(source.to_path_buf()))?;
        let ext = source
            .extension()
            .map(|e| {
                let mut dotted = OsString::from(".");
                dotted.push(e);
                dotted
            })
            .unwrap_or_default();

        let jobs = self
            .clips
            .iter()
            .map(|clip| {
                let mut name = stem.to_os_string();
                let (is_full, start_seconds, duration_seconds) = match clip.window {
                    ClipWindow::Full => {
                        name.push("_full_video");
                        (true, None, None)
                    }
                    ClipWindow::Segment { start, end } => {
                        name.push(format!(
                            "_clip_{}_to_{}",
                            format_hms(start).replace(':', "-"),
                            format_hms(end).replace(':', "-")
                        ));
                        (false, Some(start), Some(end - start))
                    }
                };
                name.push(&ext);

                JobDescriptor {
                    source_path: source.to_path_buf(),
                    output_path: self.target_dir.join(name),
                    is_full,
                    start_seconds,
                    duration_seconds,
                    encoding: clip.encoding.clone(),
                }
            })
            .collect();

        Ok(jobs)
    }
}

fn validate_spec(spec: &ClipSpec) -> Result<PlannedClip, PlanError> {
    let window = if spec.full {
        ClipWindow::Full
    } else {
        let start_raw = required_time(spec.start_time.as_deref())?;
        let end_raw = required_time(spec.end_time.as_deref())?;
        let start = parse_hms(start_raw)?;
        let end = parse_hms(end_raw)?;

        if end <= start {
            return Err(PlanError::InvalidClipRange {
                start: start_raw.to_string(),
                end: end_raw.to_string(),
            });
        }
        ClipWindow::Segment { start, end }
    };

    Ok(PlannedClip {
        window,
        encoding: spec.encoding.clone(),
    })
}

fn required_time(value: Option<&str>) -> Result<&str, PlanError> {
    value.ok_or_else(|| PlanError::InvalidTimestamp {
        value: "<missing>".to_string(),
    })
}
