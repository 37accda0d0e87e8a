use serde::{Deserialize, Serialize};

/// Encoding parameters applied to every clip.
///
/// Defaults give an H.264/AAC MP4 that plays everywhere: CRF 23, preset
/// `medium`, 8-bit 4:2:0 and 44.1 kHz audio, with the moov atom moved to
/// the front for streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    pub video_codec: String,
    /// Constant rate factor (lower = higher quality, larger file)
    pub crf: u8,
    pub preset: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_sample_rate: u32,
    /// Emit `-movflags +faststart`
    pub faststart: bool,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_sample_rate: 44_100,
            faststart: true,
        }
    }
}

/// Per-clip tweaks layered over the global profile. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingOverride {
    pub video_codec: Option<String>,
    pub crf: Option<u8>,
    pub preset: Option<String>,
    pub pixel_format: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
}

impl EncodingProfile {
    /// Merge an optional override over this profile.
    pub fn with_override(&self, over: Option<&EncodingOverride>) -> EncodingProfile {
        let Some(over) = over else {
            return self.clone();
        };

        EncodingProfile {
            video_codec: over.video_codec.clone().unwrap_or_else(|| self.video_codec.clone()),
            crf: over.crf.unwrap_or(self.crf),
            preset: over.preset.clone().unwrap_or_else(|| self.preset.clone()),
            pixel_format: over.pixel_format.clone().unwrap_or_else(|| self.pixel_format.clone()),
            audio_codec: over.audio_codec.clone().unwrap_or_else(|| self.audio_codec.clone()),
            audio_sample_rate: over.audio_sample_rate.unwrap_or(self.audio_sample_rate),
            faststart: self.faststart,
        }
    }

    /// Render the output-side ffmpeg arguments for this profile.
    pub fn output_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push("-c:v".to_string());
        args.push(self.video_codec.clone());
        args.push("-crf".to_string());
        args.push(self.crf.to_string());
        args.push("-preset".to_string());
        args.push(self.preset.clone());
        args.push("-pix_fmt".to_string());
        args.push(self.pixel_format.clone());

        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        args.push("-c:a".to_string());
        args.push(self.audio_codec.clone());
        args.push("-ar".to_string());
        args.push(self.audio_sample_rate.to_string());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_args() {
        let args = EncodingProfile::default().output_args();
        assert_eq!(
            args,
            vec![
                "-c:v", "libx264", "-crf", "23", "-preset", "medium", "-pix_fmt", "yuv420p",
                "-movflags", "+faststart", "-c:a", "aac", "-ar", "44100",
            ]
        );
    }

    #[test]
    fn test_override_replaces_only_set_fields() {
        let base = EncodingProfile::default();
        let over = EncodingOverride {
            crf: Some(18),
            preset: Some("slow".to_string()),
            ..Default::default()
        };

        let merged = base.with_override(Some(&over));
        assert_eq!(merged.crf, 18);
        assert_eq!(merged.preset, "slow");
        assert_eq!(merged.video_codec, base.video_codec);
        assert_eq!(merged.audio_sample_rate, base.audio_sample_rate);

        assert_eq!(base.with_override(None), base);
    }

    #[test]
    fn test_faststart_can_be_disabled() {
        let profile = EncodingProfile {
            faststart: false,
            ..Default::default()
        };
        assert!(!profile.output_args().iter().any(|a| a == "-movflags"));
    }
}
