use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning clip specs into jobs.
///
/// These surface when the configuration is loaded, so a bad clip list stops
/// the daemon before the watcher starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid timestamp '{value}': expected HH:MM:SS")]
    InvalidTimestamp { value: String },

    #[error("invalid clip range {start} -> {end}: end must be after start")]
    InvalidClipRange { start: String, end: String },

    #[error("source path has no usable file name: {}", .0.display())]
    InvalidSourcePath(PathBuf),
}

/// Failure of a single engine invocation. Never escapes the job that owns it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine exited with code {code}: {stderr_tail}")]
    Exit { code: i32, stderr_tail: String },
}

/// The watch session itself failed; there is no event source left.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("failed to read watch root {}: {source}", .root.display())]
    Io {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid ignore pattern '{pattern}': {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PromptError {
    #[error("confirmation input closed")]
    Closed,
}
