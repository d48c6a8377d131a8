//! Video duration via ffprobe

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("ffprobe could not be started: {0}")]
    Launch(#[from] std::io::Error),

    #[error("ffprobe failed on {path}: {stderr}")]
    Failed { path: String, stderr: String },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),

    #[error("No duration reported for {0}")]
    NoDuration(String),
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

/// Duration of the first video stream, falling back to the container duration
pub async fn video_duration(path: &Path) -> Result<Duration, MediaError> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::Failed {
            path: path.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let duration = parse_duration(&output.stdout)?
        .ok_or_else(|| MediaError::NoDuration(path.display().to_string()))?;
    debug!("{}: {:.2}s", path.display(), duration.as_secs_f64());
    Ok(duration)
}

/// Parse ffprobe JSON. `Ok(None)` when no usable duration is present.
pub fn parse_duration(json: &[u8]) -> Result<Option<Duration>, MediaError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| MediaError::Parse(e.to_string()))?;

    let from_stream = parsed
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| s.duration.as_deref().and_then(parse_secs));
    let from_format = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_secs);

    Ok(from_stream.or(from_format))
}

fn parse_secs(s: &str) -> Option<Duration> {
    let secs: f64 = s.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_stream_duration_preferred() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "duration": "99.0"},
                {"codec_type": "video", "duration": "12.512500"}
            ],
            "format": {"duration": "12.600000"}
        }"#;
        let d = parse_duration(json).unwrap().unwrap();
        assert_eq!(d, Duration::from_secs_f64(12.5125));
    }

    #[test]
    fn test_falls_back_to_format_duration() {
        let json = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "30.0"}}"#;
        assert_eq!(parse_duration(json).unwrap(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_or_bad_duration() {
        assert_eq!(parse_duration(br#"{"format": {}}"#).unwrap(), None);
        assert_eq!(
            parse_duration(br#"{"format": {"duration": "N/A"}}"#).unwrap(),
            None
        );
        assert_eq!(
            parse_duration(br#"{"format": {"duration": "-3"}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_duration(b"not json"), Err(MediaError::Parse(_))));
    }
}
