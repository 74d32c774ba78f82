//! In-process stream inspection with symphonia
//!
//! Used when the engine's probe binary is not installed. Produces the same
//! [`ProbeReport`] as the ffprobe backend, so validation does not care which
//! one ran.

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::core::ProbeError;
use crate::engine::{MediaProber, ProbeReport};

/// Prober that decodes container headers in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProber;

#[async_trait]
impl MediaProber for NativeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_audio_metadata(&path))
            .await
            .map_err(|e| ProbeError::Decode(format!("Probe task failed: {}", e)))?
    }
}

/// Extract stream parameters and cover-art presence from an audio file
pub fn read_audio_metadata(path: &Path) -> Result<ProbeReport, ProbeError> {
    let file = File::open(path)?;
    let size = file.metadata().map(|m| m.len()).ok();
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| ProbeError::Decode(format!("Failed to probe audio format: {}", e)))?;

    // Cover art can sit in the container-level tag (ID3) or in the format metadata
    let mut has_cover_art = probed
        .metadata
        .get()
        .and_then(|m| m.current().map(|rev| !rev.visuals().is_empty()))
        .unwrap_or(false);

    let mut format = probed.format;
    if !has_cover_art {
        has_cover_art = format
            .metadata()
            .current()
            .map(|rev| !rev.visuals().is_empty())
            .unwrap_or(false);
    }

    let track = format.default_track().ok_or(ProbeError::NoAudio)?;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate.filter(|r| *r > 0);
    let duration = match (params.n_frames, sample_rate) {
        (Some(frames), Some(rate)) => frames as f64 / rate as f64,
        _ => 0.0,
    };

    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_lowercase())
        .or_else(|| {
            path.extension()
                .map(|e| e.to_string_lossy().to_lowercase())
        });

    let bit_rate = match size {
        Some(bytes) if duration > 0.0 => Some((bytes as f64 * 8.0 / duration) as u64),
        _ => None,
    };

    log::debug!(
        "Native probe {:?}: codec={:?} rate={:?} duration={:.2}s cover={}",
        path.file_name(),
        codec,
        sample_rate,
        duration,
        has_cover_art
    );

    Ok(ProbeReport {
        duration,
        sample_rate,
        codec,
        channels: params.channels.map(|c| c.count() as u32),
        has_cover_art,
        bit_rate,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::generate_audio_file;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_audio_metadata(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(ProbeError::Io(_))));
    }

    #[test]
    fn test_non_audio_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.mp3");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();
        assert!(read_audio_metadata(&path).is_err());
    }

    #[tokio::test]
    async fn test_reads_generated_wav() {
        let Some(path) = generate_audio_file("native_probe", "wav", 2) else {
            return;
        };
        let report = NativeProber.probe(&path).await.unwrap();
        assert_eq!(report.sample_rate, Some(44100));
        assert!((report.duration - 2.0).abs() < 0.1);
        assert!(!report.has_cover_art);
    }
}
