use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::encoding::EncodingProfile;
use crate::error::EngineError;

/// Everything the engine needs for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Seek offset into the source, in seconds (segment jobs only)
    pub start_seconds: Option<u32>,
    /// Length to encode, in seconds (segment jobs only)
    pub duration_seconds: Option<u32>,
    pub profile: EncodingProfile,
}

/// Progress marker reported by the engine. Which fields are set is the
/// engine's choice.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineProgress {
    /// Percent of the whole source
    pub percent: Option<f64>,
    /// Position on the source timeline, in seconds
    pub timemark: Option<f64>,
}

/// Non-terminal engine events. The terminal event is the return value of
/// [`TranscodeEngine::transcode`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started { command_line: String },
    Progress(EngineProgress),
}

pub type ProgressSink = mpsc::UnboundedSender<EngineEvent>;

/// External transcoder seam.
///
/// Implementations must tolerate concurrent calls for distinct outputs.
/// The sink is dropped when the call returns, which closes the event stream.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn transcode(&self, request: EngineRequest, events: ProgressSink) -> Result<(), EngineError>;
}
