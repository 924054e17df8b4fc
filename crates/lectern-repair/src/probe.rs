//! Audio property extraction through `ffprobe`.
//!
//! # Design
//! - [`MediaInspector`] is the seam; [`FfprobeInspector`] is the shipped back-end.
//! - The probe writes to an anonymous temp file so a chatty child cannot block on a full pipe.
//! - Every failure is an [`ExtractionError`] value; nothing here panics.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use lectern_config::RepairSettings;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::model::AudioProperties;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Reads technical audio properties from a media file.
pub trait MediaInspector: Send + Sync {
    /// Inspect `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] when the file is missing or cannot be probed.
    fn inspect(&self, path: &Path) -> Result<AudioProperties, ExtractionError>;
}

/// Runs `ffprobe` with JSON output under a deadline.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    binary: PathBuf,
    timeout: Duration,
}

impl FfprobeInspector {
    /// Build an inspector for `binary` with a per-file deadline.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Build an inspector from repair settings.
    #[must_use]
    pub fn from_settings(settings: &RepairSettings) -> Self {
        Self::new(settings.ffprobe_path.clone(), settings.probe_timeout())
    }

    fn run(&self, path: &Path) -> Result<Vec<u8>, ExtractionError> {
        let mut capture = tempfile::tempfile().map_err(|source| ExtractionError::Io {
            operation: "probe.capture",
            source,
        })?;
        let stdout = capture
            .try_clone()
            .map_err(|source| ExtractionError::Io {
                operation: "probe.capture_clone",
                source,
            })?;

        let mut child = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExtractionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(err) = child.kill() {
                        debug!(error = %err, "failed to kill timed out probe");
                    }
                    let _ = child.wait();
                    return Err(ExtractionError::Timeout {
                        path: path.to_path_buf(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(ExtractionError::Io {
                        operation: "probe.wait",
                        source,
                    });
                }
            }
        };

        if !status.success() {
            return Err(ExtractionError::ProbeFailed {
                path: path.to_path_buf(),
                code: status.code(),
            });
        }

        let mut raw = Vec::new();
        capture
            .seek(SeekFrom::Start(0))
            .and_then(|_| capture.read_to_end(&mut raw))
            .map_err(|source| ExtractionError::Io {
                operation: "probe.read_output",
                source,
            })?;
        Ok(raw)
    }
}

impl MediaInspector for FfprobeInspector {
    fn inspect(&self, path: &Path) -> Result<AudioProperties, ExtractionError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(ExtractionError::NotFound {
                    path: path.to_path_buf(),
                });
            }
        };
        let raw = self.run(path).inspect_err(|err| {
            warn!(path = %path.display(), error = %err, "media probe failed");
        })?;
        parse_probe_output(path, &raw, Some(metadata.len()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    size: Option<String>,
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty() && *value != "N/A")
        .and_then(|value| value.parse().ok())
}

/// Turn ffprobe JSON into [`AudioProperties`].
///
/// The first audio stream supplies codec, sample rate, channels and bitrate.
/// Format-level bitrate and duration fill gaps; size comes from the format block
/// or `fallback_size`.
///
/// # Errors
///
/// Returns [`ExtractionError::Malformed`] for unparseable JSON and
/// [`ExtractionError::NoAudioStream`] when no stream has `codec_type == "audio"`.
pub fn parse_probe_output(
    path: &Path,
    raw: &[u8],
    fallback_size: Option<u64>,
) -> Result<AudioProperties, ExtractionError> {
    let output: ProbeOutput =
        serde_json::from_slice(raw).map_err(|source| ExtractionError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let stream = output
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| ExtractionError::NoAudioStream {
            path: path.to_path_buf(),
        })?;

    let bitrate_bps = parse_number::<u64>(stream.bit_rate.as_deref())
        .or_else(|| parse_number(output.format.bit_rate.as_deref()));
    let duration_secs = parse_number::<f64>(stream.duration.as_deref())
        .or_else(|| parse_number(output.format.duration.as_deref()))
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .unwrap_or(0.0);
    let size_bytes = parse_number::<u64>(output.format.size.as_deref())
        .or(fallback_size)
        .unwrap_or(0);

    Ok(AudioProperties {
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        bitrate_bps,
        sample_rate_hz: parse_number(stream.sample_rate.as_deref()),
        channels: stream.channels,
        duration_secs,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult<T> = anyhow::Result<T>;

    const AUDIOBOOK: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "mjpeg"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "sample_rate": "44100", "channels": 2, "bit_rate": "127999"}
        ],
        "format": {"duration": "36012.480000", "bit_rate": "130000", "size": "576199680"}
    }"#;

    #[test]
    fn first_audio_stream_supplies_properties() -> TestResult<()> {
        let props = parse_probe_output(Path::new("book.m4b"), AUDIOBOOK.as_bytes(), Some(1))?;
        assert_eq!(props.codec, "aac");
        assert_eq!(props.bitrate_bps, Some(127_999));
        assert_eq!(props.sample_rate_hz, Some(44_100));
        assert_eq!(props.channels, Some(2));
        assert!((props.duration_secs - 36_012.48).abs() < 1e-6);
        assert_eq!(props.size_bytes, 576_199_680);
        Ok(())
    }

    #[test]
    fn format_block_fills_missing_stream_fields() -> TestResult<()> {
        let raw = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3", "bit_rate": "N/A"}],
            "format": {"duration": "61.5", "bit_rate": "64000"}
        }"#;
        let props = parse_probe_output(Path::new("a.mp3"), raw.as_bytes(), Some(4096))?;
        assert_eq!(props.bitrate_bps, Some(64_000));
        assert!((props.duration_secs - 61.5).abs() < f64::EPSILON);
        assert_eq!(props.size_bytes, 4096);
        assert_eq!(props.sample_rate_hz, None);
        Ok(())
    }

    #[test]
    fn unknown_bitrate_stays_unknown() -> TestResult<()> {
        let raw = r#"{"streams": [{"codec_type": "audio", "codec_name": "flac"}], "format": {}}"#;
        let props = parse_probe_output(Path::new("a.flac"), raw.as_bytes(), None)?;
        assert_eq!(props.bitrate_bps, None);
        assert!(props.duration_secs.abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn missing_audio_stream_is_reported() {
        let raw = r#"{"streams": [{"codec_type": "video"}], "format": {}}"#;
        let result = parse_probe_output(Path::new("clip.mkv"), raw.as_bytes(), None);
        assert!(matches!(result, Err(ExtractionError::NoAudioStream { .. })));
    }

    #[test]
    fn garbage_output_is_malformed() {
        let result = parse_probe_output(Path::new("a.mp3"), b"ffprobe: not json", None);
        assert!(matches!(result, Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn missing_file_is_not_found_without_spawning() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let inspector = FfprobeInspector::new("/nonexistent/ffprobe", Duration::from_secs(1));
        let result = inspector.inspect(&dir.path().join("missing.mp3"));
        assert!(matches!(result, Err(ExtractionError::NotFound { .. })));
        Ok(())
    }

    #[test]
    fn missing_binary_is_spawn_error() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.mp3");
        fs::write(&file, b"ID3")?;
        let inspector =
            FfprobeInspector::new(dir.path().join("no-ffprobe"), Duration::from_secs(1));
        assert!(matches!(
            inspector.inspect(&file),
            Err(ExtractionError::Spawn { .. })
        ));
        Ok(())
    }
}
