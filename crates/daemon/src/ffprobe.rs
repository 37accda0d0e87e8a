use std::path::Path;
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;

/// Subset of `ffprobe -show_format` output we rely on
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    #[serde(rename = "format_name")]
    pub format_name: Option<String>,
    /// Container duration in seconds, as ffprobe prints it ("12.345000")
    pub duration: Option<String>,
    #[serde(rename = "bit_rate")]
    pub bit_rate: Option<String>,
}

impl FFProbeData {
    /// Container duration in seconds, if ffprobe reported a usable one
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Parse ffprobe's JSON output
pub fn parse_probe_output(json_str: &str) -> Result<FFProbeData> {
    serde_json::from_str(json_str).context("Failed to parse ffprobe JSON")
}

/// Run ffprobe on a file and parse the format section
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<FFProbeData> {
    use log::debug;

    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", file_path.display());
    }

    debug!("Executing FFprobe for: {}", file_path.display());

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg(file_path)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!(
            "Failed to execute FFprobe for: {}. Ensure FFprobe is installed and accessible at: {}",
            file_path.display(),
            ffprobe_bin.display()
        ))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        anyhow::bail!(
            "FFprobe failed (exit code {}) for {}:\nSTDERR: {}",
            exit_code,
            file_path.display(),
            stderr
        );
    }

    let json_str = String::from_utf8(output.stdout)
        .context("FFprobe output is not valid UTF-8")?;

    parse_probe_output(&json_str)
        .with_context(|| format!("Failed to parse ffprobe JSON for: {}", file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let data = parse_probe_output(
            r#"{"format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "487.125000", "bit_rate": "2000000"}}"#,
        )
        .unwrap();
        assert_eq!(data.duration_secs(), Some(487.125));
        assert_eq!(data.format.format_name.as_deref(), Some("mov,mp4,m4a,3gp,3g2,mj2"));
    }

    #[test]
    fn test_missing_or_bogus_duration() {
        let data = parse_probe_output(r#"{"format": {}}"#).unwrap();
        assert_eq!(data.duration_secs(), None);

        let data = parse_probe_output(r#"{"format": {"duration": "N/A"}}"#).unwrap();
        assert_eq!(data.duration_secs(), None);
    }

    #[tokio::test]
    async fn test_probe_missing_file_fails() {
        let result = probe_file(Path::new("ffprobe"), Path::new("/definitely/not/here.mp4")).await;
        assert!(result.is_err());
    }
}
