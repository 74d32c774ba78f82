//! Test fixtures for merge tests
//!
//! Scripted stand-ins for the probe and the engine, so orchestration can be
//! exercised without ffmpeg, plus a generator for real audio files when an
//! ffmpeg binary is installed.

#![cfg(test)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{MergeError, ProbeError, Result, ValidatedFile};
use crate::engine::{
    EngineRunner, EngineSignal, Invocation, MediaProber, ProbeReport, RunOutcome,
};

static FIXTURES_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the fixtures directory, creating it if necessary
pub fn fixtures_dir() -> &'static Path {
    FIXTURES_DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join("audiomerge_test_fixtures");
        std::fs::create_dir_all(&dir).expect("Failed to create fixtures directory");
        dir
    })
}

/// Stereo mp3 probe report
pub fn report(duration: f64, sample_rate: u32) -> ProbeReport {
    ProbeReport {
        duration,
        sample_rate: Some(sample_rate),
        codec: Some("mp3".to_string()),
        channels: Some(2),
        has_cover_art: false,
        bit_rate: None,
        size: None,
    }
}

/// Validated stereo mp3 whose title is the file stem
pub fn valid_file(path: impl AsRef<Path>, duration: f64, sample_rate: u32) -> ValidatedFile {
    let path = path.as_ref().to_path_buf();
    let inferred_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    ValidatedFile {
        path,
        duration,
        sample_rate: Some(sample_rate),
        codec: "mp3".to_string(),
        channel_count: 2,
        has_cover_art: false,
        inferred_title,
    }
}

enum Scripted {
    Report(ProbeReport),
    Failure,
    Delay(Duration),
}

/// Prober answering from a fixed table; unknown paths fail
#[derive(Default)]
pub struct ScriptedProber {
    answers: HashMap<PathBuf, Scripted>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(mut self, path: impl AsRef<Path>, report: ProbeReport) -> Self {
        self.answers
            .insert(path.as_ref().to_path_buf(), Scripted::Report(report));
        self
    }

    pub fn with_failure(mut self, path: impl AsRef<Path>) -> Self {
        self.answers
            .insert(path.as_ref().to_path_buf(), Scripted::Failure);
        self
    }

    /// Sleep before answering, to trip the validator's timeout
    pub fn with_delay(mut self, path: impl AsRef<Path>, delay: Duration) -> Self {
        self.answers
            .insert(path.as_ref().to_path_buf(), Scripted::Delay(delay));
        self
    }
}

#[async_trait]
impl MediaProber for ScriptedProber {
    async fn probe(&self, path: &Path) -> std::result::Result<ProbeReport, ProbeError> {
        match self.answers.get(path) {
            Some(Scripted::Report(report)) => Ok(report.clone()),
            Some(Scripted::Delay(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(report(1.0, 44100))
            }
            Some(Scripted::Failure) | None => Err(ProbeError::Failed {
                status: "exit status: 1".to_string(),
                message: "Invalid data found when processing input".to_string(),
            }),
        }
    }
}

/// Engine stand-in that records invocations instead of running anything
///
/// By default each run writes an empty output file and completes.
#[derive(Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<Invocation>>,
    timestamps: Vec<String>,
    failures_left: AtomicUsize,
    copy_first_input: bool,
    wait_for_cancel: bool,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit these `out_time` marks during every run
    pub fn with_timestamps(mut self, marks: &[&str]) -> Self {
        self.timestamps = marks.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Fail the first `n` runs with an engine failure
    pub fn fail_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Write input 0's bytes to the output, like a stream copy
    pub fn copy_first_input(mut self) -> Self {
        self.copy_first_input = true;
        self
    }

    /// Block every run until cancelled
    pub fn wait_for_cancel(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        signals: mpsc::UnboundedSender<EngineSignal>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if self.wait_for_cancel {
            cancel.cancelled().await;
            return Ok(RunOutcome::Cancelled);
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MergeError::EngineFailure {
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }

        for mark in &self.timestamps {
            let _ = signals.send(EngineSignal::Timestamp(mark.clone()));
        }

        let contents = match (self.copy_first_input, invocation.inputs.first()) {
            (true, Some(input)) => std::fs::read(&input.path).unwrap_or_default(),
            _ => Vec::new(),
        };
        std::fs::write(&invocation.output, contents)
            .map_err(|e| MergeError::io("scripted output", e))?;

        Ok(RunOutcome::Completed)
    }
}

/// Find an ffmpeg binary for generating fixtures
fn ffmpeg_path() -> Option<PathBuf> {
    which::which("ffmpeg").ok()
}

/// Generate a sine-tone audio file of the given format and duration
///
/// Returns `None` when no ffmpeg is installed, so callers can skip.
pub fn generate_audio_file(name: &str, format: &str, duration_secs: u32) -> Option<PathBuf> {
    let ffmpeg = ffmpeg_path()?;
    let extension = match format {
        "aac" => "m4a",
        other => other,
    };
    let output_path = fixtures_dir().join(format!("{}_{}.{}", name, duration_secs, extension));

    // Return cached file if it exists
    if output_path.exists() {
        return Some(output_path);
    }

    let mut cmd = Command::new(&ffmpeg);
    cmd.arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg(format!("sine=frequency=440:duration={}", duration_secs))
        .arg("-y");

    match format {
        "mp3" => cmd.arg("-codec:a").arg("libmp3lame"),
        "wav" => cmd.arg("-codec:a").arg("pcm_s16le"),
        "flac" => cmd.arg("-codec:a").arg("flac"),
        "aac" => cmd.arg("-codec:a").arg("aac"),
        _ => panic!("Unsupported format: {}", format),
    };

    cmd.arg(&output_path);

    let output = cmd.output().ok()?;
    if !output.status.success() {
        eprintln!(
            "ffmpeg could not generate fixture: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        return None;
    }

    Some(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_wav_file() {
        let Some(path) = generate_audio_file("gen_test", "wav", 1) else {
            return;
        };
        assert!(path.exists(), "Generated file should exist");
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_scripted_runner_fails_then_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new().fail_first(1);
        let invocation = Invocation {
            inputs: Vec::new(),
            output_options: Vec::new(),
            output: dir.path().join("out.mp3"),
        };
        let cancel = CancellationToken::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(runner.run(&invocation, tx, &cancel).await.is_err());
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(
            runner.run(&invocation, tx, &cancel).await.unwrap(),
            RunOutcome::Completed
        );
        assert_eq!(runner.invocations().len(), 2);
    }
}
