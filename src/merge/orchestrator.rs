//! Merge orchestration
//!
//! [`MergeEngine::merge`] runs one request end to end: validation, conflict
//! resolution, strategy choice, the fast path with silent fallback, and the
//! standard path. Progress flows out through an unbounded channel; the
//! returned [`MergeOutcome`] is the terminal event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{
    EngineSettings, MergeError, MergeOutcome, MergePlan, MergeRequest, ProgressSnapshot, Result,
};
use crate::engine::{EngineRunner, MediaProber, RunOutcome};

use super::binary::{merge_binary, PathAttempt};
use super::conflicts::{resolve, Resolution};
use super::pipeline::Pipeline;
use super::progress::ProgressTracker;
use super::strategy::{requires_re_encode, select_strategy, MergeStrategy};
use super::temp_files::TempRegistry;
use super::transcode::transcode;
use super::validator::validate_files;

/// Handle for the one merge that may be active at a time
///
/// The caller owns it and cancels through it; [`MergeEngine::merge`]
/// refuses to start while another merge holds it. Each merge gets a fresh
/// cancellation token, so a context can be reused after a cancel.
#[derive(Debug, Default)]
pub struct OperationContext {
    cancel: Mutex<CancellationToken>,
    active: AtomicBool,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the active merge to stop; the engine process is killed
    pub fn cancel(&self) {
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<ActiveGuard<'_>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MergeError::Busy);
        }
        let token = CancellationToken::new();
        if let Ok(mut current) = self.cancel.lock() {
            *current = token.clone();
        }
        Ok(ActiveGuard { ctx: self, token })
    }
}

struct ActiveGuard<'a> {
    ctx: &'a OperationContext,
    token: CancellationToken,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.ctx.active.store(false, Ordering::SeqCst);
    }
}

/// Drives merges with a prober and an engine runner
pub struct MergeEngine<P, R> {
    prober: P,
    runner: R,
    settings: EngineSettings,
    temps: TempRegistry,
}

impl<P: MediaProber, R: EngineRunner> MergeEngine<P, R> {
    pub fn new(prober: P, runner: R, settings: EngineSettings) -> Self {
        Self::with_registry(prober, runner, settings, TempRegistry::global().clone())
    }

    pub fn with_registry(
        prober: P,
        runner: R,
        settings: EngineSettings,
        temps: TempRegistry,
    ) -> Self {
        Self {
            prober,
            runner,
            settings,
            temps,
        }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run one merge request to its terminal outcome
    ///
    /// Caller-requested cancellation yields `Ok(MergeOutcome::Cancelled)`;
    /// every other failure is an error.
    pub async fn merge(
        &self,
        request: &MergeRequest,
        ctx: &OperationContext,
        progress: mpsc::UnboundedSender<ProgressSnapshot>,
    ) -> Result<MergeOutcome> {
        let guard = ctx.begin()?;
        match self.run(request, &guard.token, &progress).await {
            Err(e) if e.is_cancellation() => {
                log::info!("Merge cancelled by caller");
                Ok(MergeOutcome::Cancelled)
            }
            other => other,
        }
    }

    async fn run(
        &self,
        request: &MergeRequest,
        cancel: &CancellationToken,
        progress: &mpsc::UnboundedSender<ProgressSnapshot>,
    ) -> Result<MergeOutcome> {
        if request.files.is_empty() {
            return Err(MergeError::InvalidRequest("no input files".to_string()));
        }
        if request.output_path.as_os_str().is_empty() {
            return Err(MergeError::InvalidRequest("no output path".to_string()));
        }

        let _ = progress.send(ProgressSnapshot::analyzing());
        let validation = validate_files(
            &self.prober,
            &request.files,
            self.settings.probe_timeout(),
        );
        let checks = tokio::select! {
            checks = validation => checks,
            _ = cancel.cancelled() => return Err(MergeError::Cancelled),
        };

        let options = &request.options;
        let (files, target_rate, skipped, rate_mismatch) = match resolve(checks, options.auto_fix) {
            Resolution::Halted {
                conflicts,
                target_rate,
            } => {
                return Ok(MergeOutcome::ConflictsDetected {
                    conflicts,
                    target_sample_rate: target_rate,
                });
            }
            Resolution::Proceed {
                files,
                target_rate,
                skipped,
                rate_mismatch,
            } => (files, target_rate, skipped, rate_mismatch),
        };

        if files.is_empty() {
            return Err(MergeError::NoValidFiles);
        }

        let bitrate = if options.bitrate.trim().is_empty() {
            self.settings.default_bitrate.clone()
        } else {
            options.bitrate.clone()
        };
        let re_encode = requires_re_encode(
            &files,
            options.output_format,
            options.use_custom_bitrate,
            rate_mismatch,
        );
        let plan = MergePlan {
            ordered_files: files,
            target_sample_rate: target_rate,
            output_format: options.output_format,
            bitrate,
            custom_bitrate: options.use_custom_bitrate,
            re_encode,
        };

        let pipeline = Pipeline::new(&self.runner, &self.settings, &self.temps, cancel, progress);
        let output = &request.output_path;

        let mut merged = false;
        if select_strategy(&plan) == MergeStrategy::BinaryConcat {
            match merge_binary(&pipeline, &plan, output).await {
                PathAttempt::Success => merged = true,
                PathAttempt::FallbackRequired(reason) => {
                    log::warn!("Binary merge failed, falling back to transcode: {}", reason);
                }
                PathAttempt::Fatal(e) => return Err(e),
            }
        }

        if !merged && transcode(&pipeline, &plan, output).await? == RunOutcome::Cancelled {
            return Err(MergeError::Cancelled);
        }

        let tracker = ProgressTracker::new(
            plan.total_duration(),
            plan.re_encode,
            self.settings.high_throughput_speed,
        );
        pipeline.report(tracker.complete());
        log::info!("Merge complete: {:?}", output);

        if skipped.is_empty() {
            Ok(MergeOutcome::Complete {
                output_path: output.clone(),
            })
        } else {
            Ok(MergeOutcome::CompleteWithWarning {
                output_path: output.clone(),
                skipped,
            })
        }
    }
}
