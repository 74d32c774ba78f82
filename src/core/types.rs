//! Data model shared by the merge pipeline
//!
//! Contains the request/plan types that flow from the caller into the
//! orchestrator, and the snapshot/event types that flow back out.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Target container for the merged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    /// Plain MP3 stream with ID3 tags (lossy default)
    #[default]
    Mp3,
    /// MP4 audiobook container with chapters
    M4b,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4b => "m4b",
        }
    }

    /// Engine muxer name passed with `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4b => "mp4",
        }
    }

    /// Encoder used when the plan requires re-encoding
    pub fn encoder(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "libmp3lame",
            OutputFormat::M4b => "aac",
        }
    }

    /// Whether a source codec can be stream-copied into this container
    pub fn accepts_codec(&self, codec: &str) -> bool {
        let codec = codec.to_lowercase();
        match self {
            OutputFormat::Mp3 => codec == "mp3",
            OutputFormat::M4b => matches!(codec.as_str(), "aac" | "alac" | "mp3"),
        }
    }
}

/// A file as handed in by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute, so sidecars written elsewhere still resolve it
    pub path: PathBuf,
    /// Size on disk when the request was made, 0 if unknown
    pub declared_size: u64,
}

impl CandidateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        let declared_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            declared_size,
        }
    }

    /// File name for user-facing reports
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

/// A file that probed successfully with a positive duration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub path: PathBuf,
    /// Duration in seconds, always > 0
    pub duration: f64,
    /// Sample rate in Hz, None when the probe could not tell
    pub sample_rate: Option<u32>,
    /// Lower-case codec name (e.g. "mp3", "aac")
    pub codec: String,
    pub channel_count: u32,
    pub has_cover_art: bool,
    /// File stem, used as a fallback title
    pub inferred_title: String,
}

impl ValidatedFile {
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Lower-case source extension
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Why a file blocks or was dropped from a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    Corrupt,
    Empty,
    SampleRateMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub file_name: String,
    pub reason: ConflictReason,
    pub details: String,
}

/// Options accompanying a merge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    pub output_format: OutputFormat,
    /// Engine bitrate string such as "64k"
    pub bitrate: String,
    pub auto_fix: bool,
    pub use_custom_bitrate: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Mp3,
            bitrate: "64k".to_string(),
            auto_fix: false,
            use_custom_bitrate: false,
        }
    }
}

/// Inbound merge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub files: Vec<PathBuf>,
    pub output_path: PathBuf,
    #[serde(default)]
    pub options: MergeOptions,
}

/// One chapter of the merged output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

/// Everything needed to run one merge, fixed once validation is done
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub ordered_files: Vec<ValidatedFile>,
    pub target_sample_rate: u32,
    pub output_format: OutputFormat,
    pub bitrate: String,
    /// Caller asked for an explicit bitrate
    pub custom_bitrate: bool,
    /// Audio must be re-encoded rather than stream-copied
    pub re_encode: bool,
}

impl MergePlan {
    /// Sum of all file durations in seconds
    pub fn total_duration(&self) -> f64 {
        self.ordered_files.iter().map(|f| f.duration).sum()
    }

    /// First file, the source of global tags and cover art
    pub fn tag_source(&self) -> Option<&ValidatedFile> {
        self.ordered_files.first()
    }
}

/// Coarse phase label shown next to numeric progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analyzing,
    Transcoding,
    Merging,
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub stage: Stage,
    /// 0-99 while running, 100 only on completion
    pub percent: f64,
    /// Media seconds processed per wall-clock second, 0 until known
    pub speed_factor: f64,
    pub eta_seconds: f64,
    pub current_seconds: f64,
    pub total_seconds: f64,
}

impl ProgressSnapshot {
    pub fn analyzing() -> Self {
        Self {
            stage: Stage::Analyzing,
            percent: 0.0,
            speed_factor: 0.0,
            eta_seconds: 0.0,
            current_seconds: 0.0,
            total_seconds: 0.0,
        }
    }
}

/// Terminal result of one merge attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Complete {
        output_path: PathBuf,
    },
    CompleteWithWarning {
        output_path: PathBuf,
        skipped: Vec<String>,
    },
    ConflictsDetected {
        conflicts: Vec<Conflict>,
        target_sample_rate: u32,
    },
    /// Stopped at the caller's request; not an error
    Cancelled,
}

/// Outbound event, one JSON object per line on the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MergeEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        stage: Stage,
        percent: f64,
        eta: u64,
        speed: String,
        current_seconds: f64,
        total_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    ConflictsDetected {
        conflicts: Vec<Conflict>,
        target_sample_rate: u32,
    },
    #[serde(rename_all = "camelCase")]
    Complete { output_path: PathBuf },
    #[serde(rename_all = "camelCase")]
    CompleteWithWarning {
        output_path: PathBuf,
        skipped: Vec<String>,
    },
    Error { message: String },
}

impl From<&ProgressSnapshot> for MergeEvent {
    fn from(s: &ProgressSnapshot) -> Self {
        MergeEvent::Progress {
            stage: s.stage,
            percent: (s.percent * 100.0).round() / 100.0,
            eta: s.eta_seconds.ceil().max(0.0) as u64,
            speed: format!("{:.1}x", s.speed_factor),
            current_seconds: s.current_seconds,
            total_seconds: s.total_seconds,
        }
    }
}

impl MergeEvent {
    /// Map a terminal outcome to its event; cancellation has none
    pub fn from_outcome(outcome: MergeOutcome) -> Option<Self> {
        match outcome {
            MergeOutcome::Complete { output_path } => Some(MergeEvent::Complete { output_path }),
            MergeOutcome::CompleteWithWarning {
                output_path,
                skipped,
            } => Some(MergeEvent::CompleteWithWarning {
                output_path,
                skipped,
            }),
            MergeOutcome::ConflictsDetected {
                conflicts,
                target_sample_rate,
            } => Some(MergeEvent::ConflictsDetected {
                conflicts,
                target_sample_rate,
            }),
            MergeOutcome::Cancelled => None,
        }
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
