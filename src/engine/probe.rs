//! Stream inspection through the engine's probe binary
//!
//! Runs `ffprobe` with JSON output and normalises the result into a
//! [`ProbeReport`]. Any failure to produce a report is a [`ProbeError`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::core::ProbeError;

/// Canonical metadata for one audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Duration in seconds, 0 when the probe could not determine it
    pub duration: f64,
    pub sample_rate: Option<u32>,
    /// Lower-case codec name
    pub codec: Option<String>,
    pub channels: Option<u32>,
    /// An image stream (embedded cover) is present
    pub has_cover_art: bool,
    /// Overall bitrate in bits per second
    pub bit_rate: Option<u64>,
    pub size: Option<u64>,
}

/// Something that can inspect an audio file's streams
///
/// Implementations must be safe to call concurrently; the validator fans out
/// one call per input file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;
}

#[async_trait]
impl<T: MediaProber + ?Sized> MediaProber for Box<T> {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        (**self).probe(path).await
    }
}

/// Prober backed by the external `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        log::debug!("Probing {}", path.display());

        let output = Command::new(&self.binary_path)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                message: stderr.lines().last().unwrap_or("Unknown error").to_string(),
            });
        }

        parse_ffprobe_json(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

/// ffprobe reports numbers as strings, sometimes "N/A"
fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<ProbeReport, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(bytes)?;

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let has_cover_art = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video"));

    let format_duration: Option<f64> =
        parse_number(parsed.format.as_ref().and_then(|f| f.duration.as_ref()));
    let stream_duration: Option<f64> = parse_number(audio.and_then(|a| a.duration.as_ref()));

    // Container duration wins; stream duration covers raw streams without one
    let duration = format_duration
        .filter(|d| *d > 0.0)
        .or(stream_duration)
        .unwrap_or(0.0);

    // Failure only when there is neither an audio stream nor a duration
    if audio.is_none() && !(duration > 0.0) {
        return Err(ProbeError::NoAudio);
    }

    Ok(ProbeReport {
        duration,
        sample_rate: audio
            .and_then(|a| parse_number::<u32>(a.sample_rate.as_ref()))
            .filter(|r| *r > 0),
        codec: audio.and_then(|a| a.codec_name.as_ref().map(|c| c.to_lowercase())),
        channels: audio.and_then(|a| a.channels),
        has_cover_art,
        bit_rate: parse_number(parsed.format.as_ref().and_then(|f| f.bit_rate.as_ref())),
        size: parse_number(parsed.format.as_ref().and_then(|f| f.size.as_ref())),
    })
}
