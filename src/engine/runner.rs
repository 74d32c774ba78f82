//! Engine process execution
//!
//! An [`EngineRunner`] turns an [`Invocation`] into a running ffmpeg process,
//! forwards progress as [`EngineSignal`]s and stops the process when the
//! operation's cancellation token fires.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{MergeError, Result};

/// One input and the options that precede its `-i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub options: Vec<String>,
    pub path: PathBuf,
}

impl InputSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: Vec::new(),
            path: path.into(),
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Everything the engine needs for one run, minus global flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub inputs: Vec<InputSpec>,
    pub output_options: Vec<String>,
    pub output: PathBuf,
}

impl Invocation {
    /// Arguments in engine order: each input's options and `-i`, then the
    /// output options, then the output path
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }
        args.extend(self.output_options.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// True if `flag` is followed by `value` somewhere in the output options
    #[cfg(test)]
    pub fn has_option(&self, flag: &str, value: &str) -> bool {
        self.output_options
            .windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }
}

/// Progress reported by a running engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// Output position as a timemark (`HH:MM:SS.micro`)
    Timestamp(String),
    /// Direct completion percentage, when the engine knows one
    Percent(f64),
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Runs engine invocations
#[async_trait]
pub trait EngineRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        signals: mpsc::UnboundedSender<EngineSignal>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>;
}

/// Runner that spawns the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

/// Global flags put in front of every invocation
const GLOBAL_ARGS: &[&str] = &[
    "-hide_banner",
    "-loglevel",
    "error",
    "-nostats",
    "-progress",
    "pipe:1",
    "-y",
];

/// Interpret one line of `-progress` output
///
/// `out_time=` carries position and `progress=end` marks the last block.
/// `N/A` and negative times (seen while the muxer is still priming) are dropped.
pub fn parse_progress_line(line: &str) -> Option<EngineSignal> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    if key == "progress" {
        return (value == "end").then_some(EngineSignal::Percent(100.0));
    }
    if key != "out_time" {
        return None;
    }
    if value.is_empty() || value == "N/A" || value.starts_with('-') {
        return None;
    }
    Some(EngineSignal::Timestamp(value.to_string()))
}

#[async_trait]
impl EngineRunner for FfmpegRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        signals: mpsc::UnboundedSender<EngineSignal>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let args = invocation.to_args();
        log::debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(GLOBAL_ARGS)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MergeError::EngineSpawn {
                binary: self.binary.clone(),
                source: e,
            })?;

        // Drain stderr concurrently so a chatty engine cannot block on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(signal) = parse_progress_line(&line) {
                        // Receiver gone means nobody is watching; keep draining
                        let _ = signals.send(signal);
                    }
                }
            })
        });

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| MergeError::io("Failed to wait for engine", e))?
            }
            _ = cancel.cancelled() => {
                log::info!("Cancellation requested, stopping engine");
                if let Err(e) = child.start_kill() {
                    log::warn!("Failed to kill engine process: {}", e);
                }
                let _ = child.wait().await;
                return Ok(RunOutcome::Cancelled);
            }
        };

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        if !status.success() {
            log::error!("Engine failed ({}): {}", status, stderr.trim());
            return Err(MergeError::engine_failure(status, &stderr));
        }

        Ok(RunOutcome::Completed)
    }
}
