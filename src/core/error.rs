//! Error types for merge operations
//!
//! Per-file validation problems (corrupt, empty, sample-rate mismatch) are not
//! errors; they are collected as [`Conflict`](super::Conflict)s and reported in
//! one round trip. The types here cover everything that aborts a merge.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Unrecoverable failure of a merge attempt
#[derive(Debug, Error)]
pub enum MergeError {
    /// The engine process exited abnormally without being asked to stop
    #[error("engine exited with {status}: {stderr}")]
    EngineFailure {
        /// Exit status description
        status: String,
        /// Last lines of the engine's stderr
        stderr: String,
    },

    /// The engine process could not be started at all
    #[error("failed to spawn engine {binary}: {source}")]
    EngineSpawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No usable engine binary was found
    #[error("engine binary not found: {0}")]
    EngineNotFound(String),

    /// Sidecar write, raw concatenation or temp cleanup failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Every input was dropped during validation
    #[error("No valid files.")]
    NoValidFiles,

    /// A merge is already running on this operation context
    #[error("a merge is already in progress")]
    Busy,

    /// The caller cancelled the operation
    #[error("merge cancelled")]
    Cancelled,

    /// The inbound request is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl MergeError {
    /// Wrap an I/O error with a short description of what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MergeError::Io {
            context: context.into(),
            source,
        }
    }

    /// Build an engine failure from an exit status and captured stderr
    pub fn engine_failure(status: ExitStatus, stderr: &str) -> Self {
        let tail: Vec<&str> = stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .rev()
            .take(3)
            .collect();
        let stderr = if tail.is_empty() {
            "Unknown error".to_string()
        } else {
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        };
        MergeError::EngineFailure {
            status: status.to_string(),
            stderr,
        }
    }

    /// True when this error is the result of caller-requested termination
    pub fn is_cancellation(&self) -> bool {
        matches!(self, MergeError::Cancelled)
    }
}

/// Failure of a single stream inspection
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe exited with {status}: {message}")]
    Failed { status: String, message: String },

    #[error("unreadable probe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no audio stream found")]
    NoAudio,

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancelled_is_cancellation() {
        assert!(MergeError::Cancelled.is_cancellation());
        assert!(!MergeError::NoValidFiles.is_cancellation());
        assert!(!MergeError::Busy.is_cancellation());
    }

    #[test]
    fn test_io_error_display_includes_context() {
        let err = MergeError::io(
            "Failed to write chapter sidecar",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to write chapter sidecar"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_no_valid_files_message() {
        assert_eq!(MergeError::NoValidFiles.to_string(), "No valid files.");
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_failure_keeps_stderr_tail() {
        use std::os::unix::process::ExitStatusExt;

        let status = ExitStatus::from_raw(1 << 8);
        let stderr = "line one\n\nline two\nline three\nline four\n";
        match MergeError::engine_failure(status, stderr) {
            MergeError::EngineFailure { stderr, .. } => {
                assert_eq!(stderr, "line two | line three | line four");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
