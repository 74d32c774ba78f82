//! File validation
//!
//! Probes every candidate concurrently, each under its own timeout, and only
//! returns once all of them have settled. Results keep the input order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::core::{
    file_name_of, format_duration, format_size, CandidateFile, ProbeError, ValidatedFile,
};
use crate::engine::{MediaProber, ProbeReport};

/// Verdict for one candidate file
#[derive(Debug, Clone, PartialEq)]
pub enum FileCheck {
    Valid(ValidatedFile),
    /// Probe failed or timed out
    Corrupt { path: PathBuf, details: String },
    /// Probe succeeded but reported no playable duration
    Empty { path: PathBuf },
}

impl FileCheck {
    pub fn path(&self) -> &Path {
        match self {
            FileCheck::Valid(file) => &file.path,
            FileCheck::Corrupt { path, .. } | FileCheck::Empty { path } => path,
        }
    }

    pub fn file_name(&self) -> String {
        file_name_of(self.path())
    }
}

/// Probe one file, bounded by `timeout`
async fn probe_with_timeout<P: MediaProber + ?Sized>(
    prober: &P,
    path: &Path,
    timeout: Duration,
) -> Result<ProbeReport, ProbeError> {
    match tokio::time::timeout(timeout, prober.probe(path)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

fn classify(path: &Path, result: Result<ProbeReport, ProbeError>) -> FileCheck {
    let report = match result {
        Ok(report) => report,
        Err(ProbeError::Timeout(_)) => {
            log::warn!("Probe timed out for {}", path.display());
            return FileCheck::Corrupt {
                path: path.to_path_buf(),
                details: "Timeout".to_string(),
            };
        }
        Err(e) => {
            log::warn!("Probe failed for {}: {}", path.display(), e);
            return FileCheck::Corrupt {
                path: path.to_path_buf(),
                details: "Corrupt".to_string(),
            };
        }
    };

    if !(report.duration > 0.0) {
        return FileCheck::Empty {
            path: path.to_path_buf(),
        };
    }

    let inferred_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    FileCheck::Valid(ValidatedFile {
        path: path.to_path_buf(),
        duration: report.duration,
        sample_rate: report.sample_rate,
        codec: report.codec.unwrap_or_default(),
        channel_count: report.channels.unwrap_or(0),
        has_cover_art: report.has_cover_art,
        inferred_title,
    })
}

/// Validate every file; the returned list matches `files` index for index
pub async fn validate_files<P: MediaProber + ?Sized>(
    prober: &P,
    files: &[PathBuf],
    timeout: Duration,
) -> Vec<FileCheck> {
    let probes = files.iter().map(|path| async move {
        let candidate = CandidateFile::new(path);
        log::debug!(
            "Probing {} ({})",
            candidate.file_name(),
            format_size(candidate.declared_size)
        );
        let result = probe_with_timeout(prober, &candidate.path, timeout).await;
        classify(&candidate.path, result)
    });

    let checks = join_all(probes).await;
    log::info!(
        "Validated {} files ({} usable)",
        checks.len(),
        checks
            .iter()
            .filter(|c| matches!(c, FileCheck::Valid(_)))
            .count()
    );
    checks
}

/// Display metadata for one file in a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub bitrate: String,
    pub channels: String,
    pub duration: f64,
    pub size: u64,
    pub error: bool,
}

impl ScanEntry {
    /// One row of the `scan` table
    pub fn display_row(&self) -> String {
        if self.error {
            return format!("{:<40} unreadable", self.file_name);
        }
        let rate = self
            .sample_rate
            .map(|r| format!("{} Hz", r))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{:<40} {:<6} {:>9} {:>6} {:<7} {:>7} {:>10}",
            self.file_name,
            self.codec,
            rate,
            self.bitrate,
            self.channels,
            format_duration(self.duration),
            format_size(self.size)
        )
    }
}

fn channel_label(channels: Option<u32>) -> String {
    match channels {
        Some(1) => "Mono".to_string(),
        Some(2) => "Stereo".to_string(),
        Some(n) if n > 0 => format!("{} Ch", n),
        _ => "-".to_string(),
    }
}

fn scan_entry(path: &Path, result: Result<ProbeReport, ProbeError>) -> ScanEntry {
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    match result {
        Ok(report) => ScanEntry {
            path: path.to_path_buf(),
            file_name: file_name_of(path),
            codec: report
                .codec
                .as_deref()
                .map(str::to_uppercase)
                .unwrap_or_else(|| "?".to_string()),
            sample_rate: report.sample_rate,
            bitrate: report
                .bit_rate
                .map(|b| format!("{}k", (b as f64 / 1000.0).round() as u64))
                .unwrap_or_else(|| "-".to_string()),
            channels: channel_label(report.channels),
            duration: report.duration,
            size: report.size.unwrap_or(file_size),
            error: false,
        },
        Err(e) => {
            log::debug!("Scan could not read {}: {}", path.display(), e);
            ScanEntry {
                path: path.to_path_buf(),
                file_name: file_name_of(path),
                codec: String::new(),
                sample_rate: None,
                bitrate: String::new(),
                channels: String::new(),
                duration: 0.0,
                size: file_size,
                error: true,
            }
        }
    }
}

/// Probe files for display, concurrently, keeping input order
pub async fn scan_files<P: MediaProber + ?Sized>(
    prober: &P,
    files: &[PathBuf],
    timeout: Duration,
) -> Vec<ScanEntry> {
    let probes = files.iter().map(|path| async move {
        let result = probe_with_timeout(prober, path, timeout).await;
        scan_entry(path, result)
    });
    join_all(probes).await
}
