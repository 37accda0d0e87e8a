use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::WatchConfig;
use crate::engine::{EngineEvent, EngineProgress, EngineRequest, ProgressSink, TranscodeEngine};
use crate::error::EngineError;
use crate::ffprobe;
use crate::timecode::parse_timemark;

/// Number of stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Transcoder backed by a local ffmpeg binary.
///
/// Progress comes from `-progress pipe:1`. Timemarks are reported on the
/// source timeline, i.e. with the seek offset added back, and full-video
/// runs also report percent of the probed source duration.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    pub fn from_config(cfg: &WatchConfig) -> Self {
        Self::new(cfg.ffmpeg_bin.clone(), cfg.ffprobe_bin.clone())
    }

    async fn source_duration(&self, request: &EngineRequest) -> Option<f64> {
        if request.start_seconds.is_some() {
            return None;
        }
        match ffprobe::probe_file(&self.ffprobe_bin, &request.source).await {
            Ok(meta) => meta.duration_secs(),
            Err(e) => {
                warn!("Could not probe duration of {}: {:#}", request.source.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn transcode(&self, request: EngineRequest, events: ProgressSink) -> Result<(), EngineError> {
        let total = self.source_duration(&request).await;
        let args = CommandBuilder::new().build_transcode_command(&request);

        let command_line = format!("{} {}", self.ffmpeg_bin.display(), args.join(" "));
        debug!("Executing FFmpeg: {}", command_line);

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.ffmpeg_bin.display().to_string(),
                source,
            })?;
        let _ = events.send(EngineEvent::Started { command_line });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stderr not captured"))?;

        // Drain stderr concurrently so a chatty encoder never blocks on a full pipe.
        let stderr_handle = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let mut parser = ProgressParser::new(request.start_seconds.map(f64::from).unwrap_or(0.0), total);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(progress) = parser.feed(&line) {
                let _ = events.send(EngineEvent::Progress(progress));
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Exit {
                code: status.code().unwrap_or(-1),
                stderr_tail,
            });
        }

        Ok(())
    }
}

/// Command builder for generating FFmpeg command lines
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder
    }

    /// Build the argument list for one clip.
    ///
    /// Segment jobs seek on the input side (`-ss`/`-t` before `-i`), which is
    /// fast and keeps output timestamps starting at zero.
    pub fn build_transcode_command(&self, request: &EngineRequest) -> Vec<String> {
        let mut args = Vec::new();

        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push("-y".to_string());

        if let (Some(start), Some(duration)) = (request.start_seconds, request.duration_seconds) {
            args.push("-ss".to_string());
            args.push(start.to_string());
            args.push("-t".to_string());
            args.push(duration.to_string());
        }

        args.push("-i".to_string());
        args.push(request.source.to_string_lossy().to_string());

        args.extend(request.profile.output_args());

        args.push(request.output.to_string_lossy().to_string());

        args
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental parser for ffmpeg's `-progress` key=value stream.
///
/// One event is produced per `progress=` block terminator, using the latest
/// `out_time*` value of that block.
#[derive(Debug)]
pub struct ProgressParser {
    offset: f64,
    total: Option<f64>,
    current: Option<f64>,
}

impl ProgressParser {
    pub fn new(offset: f64, total: Option<f64>) -> Self {
        Self {
            offset,
            total,
            current: None,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<EngineProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds in current ffmpeg releases.
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.current = Some(us as f64 / 1_000_000.0);
                }
                None
            }
            "out_time" => {
                if let Some(secs) = parse_timemark(value) {
                    self.current = Some(secs);
                }
                None
            }
            "progress" => {
                let elapsed = self.current?.max(0.0);
                let percent = self
                    .total
                    .map(|total| (elapsed / total * 100.0).clamp(0.0, 100.0));
                Some(EngineProgress {
                    percent,
                    timemark: Some(self.offset + elapsed),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodingProfile;
    use tokio::sync::mpsc;

    fn request(start: Option<u32>, duration: Option<u32>) -> EngineRequest {
        EngineRequest {
            source: PathBuf::from("/in/clip.mp4"),
            output: PathBuf::from("/out/clip_clip_00-00-10_to_00-00-20.mp4"),
            start_seconds: start,
            duration_seconds: duration,
            profile: EncodingProfile::default(),
        }
    }

    #[test]
    fn test_segment_command_seeks_input() {
        let args = CommandBuilder::new().build_transcode_command(&request(Some(10), Some(10)));

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input, "seek must precede the input");
        assert_eq!(args[ss + 1], "10");
        assert_eq!(args[ss + 2], "-t");
        assert_eq!(args[ss + 3], "10");
        assert_eq!(args[input + 1], "/in/clip.mp4");
        assert_eq!(args.last().unwrap(), "/out/clip_clip_00-00-10_to_00-00-20.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
    }

    #[test]
    fn test_full_command_has_no_timing() {
        let args = CommandBuilder::new().build_transcode_command(&request(None, None));
        assert!(!args.iter().any(|a| a == "-ss" || a == "-t"));
        assert!(args.windows(2).any(|w| w[0] == "-progress" && w[1] == "pipe:1"));
    }

    #[test]
    fn test_progress_parser_adds_offset() {
        let mut parser = ProgressParser::new(475.0, None);
        assert_eq!(parser.feed("frame=10"), None);
        assert_eq!(parser.feed("out_time_us=2000000"), None);
        assert_eq!(parser.feed("out_time=00:00:02.000000"), None);

        let progress = parser.feed("progress=continue").unwrap();
        assert_eq!(progress.timemark, Some(477.0));
        assert_eq!(progress.percent, None);
    }

    #[test]
    fn test_progress_parser_percent_of_total() {
        let mut parser = ProgressParser::new(0.0, Some(200.0));
        parser.feed("out_time_us=50000000");
        let progress = parser.feed("progress=continue").unwrap();
        assert_eq!(progress.percent, Some(25.0));

        parser.feed("out_time=00:04:00.000000");
        let progress = parser.feed("progress=end").unwrap();
        assert_eq!(progress.percent, Some(100.0));
    }

    #[test]
    fn test_progress_parser_waits_for_time() {
        let mut parser = ProgressParser::new(0.0, Some(10.0));
        parser.feed("out_time=N/A");
        assert_eq!(parser.feed("progress=continue"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let engine = FfmpegEngine::new("/nonexistent/ffmpeg-binary", "/nonexistent/ffprobe-binary");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = engine.transcode(request(Some(10), Some(10)), tx).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));

        // Nothing started, so no start event either.
        assert_eq!(rx.recv().await, None);
    }
}
