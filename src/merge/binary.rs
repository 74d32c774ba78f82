//! Fast path: byte-level concatenation plus a header repair pass
//!
//! MPEG audio frames are self-contained, so appending the files yields a
//! playable stream with stale headers and tags. A single engine pass then
//! stream-copies the audio while taking tags and cover art from the first file.

use std::path::Path;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::core::{MergeError, MergePlan, ProgressSnapshot, Result, Stage, ValidatedFile};
use crate::engine::{EngineRunner, EngineSignal, InputSpec, Invocation, RunOutcome};

use super::pipeline::Pipeline;
use super::progress::{parse_timemark, IN_FLIGHT_CAP};

/// Share of overall progress given to the raw concatenation phase
const RAW_PHASE_SHARE: f64 = 90.0;

/// Outcome of trying one merge path
#[derive(Debug)]
pub enum PathAttempt {
    Success,
    /// This path failed in a way the standard path may survive
    FallbackRequired(String),
    /// Stop the merge; includes caller cancellation
    Fatal(MergeError),
}

/// Progress while copying `ratio` of file `index`
fn raw_phase_snapshot(
    index: usize,
    count: usize,
    ratio: f64,
    seconds_before: f64,
    file_duration: f64,
    total_seconds: f64,
    elapsed_secs: f64,
) -> ProgressSnapshot {
    let window = RAW_PHASE_SHARE / count.max(1) as f64;
    let ratio = ratio.clamp(0.0, 1.0);
    let percent = (index as f64 * window + ratio * window).min(RAW_PHASE_SHARE);
    let current_seconds = seconds_before + ratio * file_duration;

    let speed_factor = if elapsed_secs > 1.0 && current_seconds > 0.0 {
        current_seconds / elapsed_secs
    } else {
        0.0
    };
    let eta_seconds = if speed_factor > 0.0 {
        ((total_seconds - current_seconds) / speed_factor).max(0.0)
    } else {
        0.0
    };

    ProgressSnapshot {
        stage: Stage::Merging,
        percent,
        speed_factor,
        eta_seconds,
        current_seconds,
        total_seconds,
    }
}

/// Progress of the repair pass, mapped into the last tenth
fn repair_phase_percent(signal: &EngineSignal, total_seconds: f64) -> Option<f64> {
    let step = match signal {
        EngineSignal::Timestamp(mark) if total_seconds > 0.0 => {
            parse_timemark(mark)? / total_seconds * 100.0
        }
        EngineSignal::Timestamp(_) => return None,
        EngineSignal::Percent(p) if p.is_finite() => *p,
        EngineSignal::Percent(_) => return None,
    };
    let share = 100.0 - RAW_PHASE_SHARE;
    Some((RAW_PHASE_SHARE + step.clamp(0.0, 100.0) * share / 100.0).min(IN_FLIGHT_CAP))
}

/// Arguments for the repair pass over `raw`, with `tag_source` as input 1
pub fn repair_invocation(raw: &Path, tag_source: &ValidatedFile, output: &Path) -> Invocation {
    let mut options: Vec<String> = ["-map", "0:a", "-map_metadata", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if tag_source.has_cover_art {
        options.extend(
            ["-map", "1:v", "-c:v", "copy", "-disposition:v:0", "attached_pic"]
                .iter()
                .map(|s| s.to_string()),
        );
    }
    options.extend(
        ["-c:a", "copy", "-id3v2_version", "3", "-f", "mp3"]
            .iter()
            .map(|s| s.to_string()),
    );

    Invocation {
        inputs: vec![InputSpec::new(raw), InputSpec::new(&tag_source.path)],
        output_options: options,
        output: output.to_path_buf(),
    }
}

/// Stream every file into `dest` in plan order, one buffer at a time
async fn concatenate_raw<R: EngineRunner + ?Sized>(
    pipeline: &Pipeline<'_, R>,
    plan: &MergePlan,
    dest: &Path,
) -> Result<()> {
    let mut out = tokio::fs::File::create(dest)
        .await
        .map_err(|e| MergeError::io("Failed to create raw concat file", e))?;

    let count = plan.ordered_files.len();
    let total_seconds = plan.total_duration();
    let interval = pipeline.settings.progress_interval();
    let mut buffer = vec![0u8; pipeline.settings.copy_buffer_size.max(4096)];
    let started = Instant::now();
    let mut last_report: Option<Instant> = None;
    let mut seconds_before = 0.0;

    for (index, file) in plan.ordered_files.iter().enumerate() {
        let mut input = tokio::fs::File::open(&file.path)
            .await
            .map_err(|e| MergeError::io(format!("Failed to open {}", file.path.display()), e))?;
        let size = input.metadata().await.map(|m| m.len()).unwrap_or(0);
        let mut copied: u64 = 0;

        loop {
            if pipeline.cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            let n = input
                .read(&mut buffer)
                .await
                .map_err(|e| MergeError::io(format!("Failed to read {}", file.path.display()), e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])
                .await
                .map_err(|e| MergeError::io("Failed to write raw concat file", e))?;
            copied += n as u64;

            let due = last_report.is_none_or(|t| t.elapsed() >= interval);
            if due && size > 0 {
                last_report = Some(Instant::now());
                pipeline.report(raw_phase_snapshot(
                    index,
                    count,
                    copied as f64 / size as f64,
                    seconds_before,
                    file.duration,
                    total_seconds,
                    started.elapsed().as_secs_f64(),
                ));
            }
        }

        pipeline.report(raw_phase_snapshot(
            index,
            count,
            1.0,
            seconds_before,
            file.duration,
            total_seconds,
            started.elapsed().as_secs_f64(),
        ));
        seconds_before += file.duration;
    }

    out.flush()
        .await
        .map_err(|e| MergeError::io("Failed to flush raw concat file", e))?;
    Ok(())
}

/// Rewrite headers and tags of the raw stream into the final output
async fn repair_headers<R: EngineRunner + ?Sized>(
    pipeline: &Pipeline<'_, R>,
    plan: &MergePlan,
    raw: &Path,
    output: &Path,
) -> Result<RunOutcome> {
    let Some(tag_source) = plan.tag_source() else {
        return Err(MergeError::NoValidFiles);
    };
    let total_seconds = plan.total_duration();

    pipeline.report(ProgressSnapshot {
        stage: Stage::Finalizing,
        percent: RAW_PHASE_SHARE,
        speed_factor: 0.0,
        eta_seconds: 0.0,
        current_seconds: total_seconds,
        total_seconds,
    });

    let invocation = repair_invocation(raw, tag_source, output);
    let mut last_percent = RAW_PHASE_SHARE;
    pipeline
        .run_engine(&invocation, |signal| {
            if let Some(percent) = repair_phase_percent(signal, total_seconds) {
                last_percent = last_percent.max(percent);
                pipeline.report(ProgressSnapshot {
                    stage: Stage::Finalizing,
                    percent: last_percent,
                    speed_factor: 0.0,
                    eta_seconds: 0.0,
                    current_seconds: total_seconds,
                    total_seconds,
                });
            }
        })
        .await
}

/// Try the fast path; the raw temp file never outlives this call
pub async fn merge_binary<R: EngineRunner + ?Sized>(
    pipeline: &Pipeline<'_, R>,
    plan: &MergePlan,
    output: &Path,
) -> PathAttempt {
    let raw = pipeline.temps.create("raw", "mp3");
    log::info!(
        "Binary concatenation of {} files via {:?}",
        plan.ordered_files.len(),
        raw.path()
    );

    let result = match concatenate_raw(pipeline, plan, raw.path()).await {
        Ok(()) => repair_headers(pipeline, plan, raw.path(), output).await,
        Err(e) => Err(e),
    };

    if let Err(e) = raw.remove() {
        log::warn!("{}", e);
    }

    match result {
        Ok(RunOutcome::Completed) => PathAttempt::Success,
        Ok(RunOutcome::Cancelled) => PathAttempt::Fatal(MergeError::Cancelled),
        Err(e) if e.is_cancellation() => PathAttempt::Fatal(e),
        Err(e) => PathAttempt::FallbackRequired(e.to_string()),
    }
}
