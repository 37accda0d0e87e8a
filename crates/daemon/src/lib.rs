pub mod config;
pub mod dispatcher;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod ffprobe;
pub mod gate;
pub mod job;
pub mod lifecycle;
pub mod planner;
pub mod prompt;
pub mod supervisor;
pub mod timecode;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{WatchConfig, WatchOptions};
pub use dispatcher::{Dispatcher, EventOutcome};
pub use encoding::{EncodingOverride, EncodingProfile};
pub use engine::{EngineEvent, EngineProgress, EngineRequest, TranscodeEngine};
pub use error::{EngineError, PlanError, PromptError, WatchError};
pub use ffmpeg::FfmpegEngine;
pub use planner::{ClipSpec, JobDescriptor, SegmentPlanner};
pub use prompt::{ConfirmationInput, PromptRouter};
pub use supervisor::{BatchReport, BatchSupervisor, JobOutcome, JobState};
pub use watcher::DirectoryWatcher;
