//! Progress normalisation
//!
//! Engine signals arrive as timemarks or bare percentages. The tracker folds
//! them into [`ProgressSnapshot`]s with a monotonic percent capped at 99;
//! only [`ProgressTracker::complete`] reports 100.

use std::time::Duration;

use crate::core::{ProgressSnapshot, Stage};
use crate::engine::EngineSignal;

/// Highest percent reported while work is still running
pub const IN_FLIGHT_CAP: f64 = 99.0;

/// Parse `HH:MM:SS.ms`, `MM:SS.ms` or plain seconds
pub fn parse_timemark(mark: &str) -> Option<f64> {
    let mark = mark.trim();
    if mark.is_empty() || mark.starts_with('-') {
        return None;
    }

    let parts: Vec<&str> = mark.split(':').collect();
    let seconds = match parts.as_slice() {
        [s] => s.parse::<f64>().ok()?,
        [m, s] => m.parse::<f64>().ok()? * 60.0 + s.parse::<f64>().ok()?,
        [h, m, s] => {
            h.parse::<f64>().ok()? * 3600.0 + m.parse::<f64>().ok()? * 60.0 + s.parse::<f64>().ok()?
        }
        _ => return None,
    };

    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Converts raw engine signals into snapshots for one engine run
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_seconds: f64,
    re_encode: bool,
    high_throughput_speed: f64,
    processed_seconds: f64,
    last_percent: f64,
}

impl ProgressTracker {
    pub fn new(total_seconds: f64, re_encode: bool, high_throughput_speed: f64) -> Self {
        Self {
            total_seconds: total_seconds.max(0.0),
            re_encode,
            high_throughput_speed,
            processed_seconds: 0.0,
            last_percent: 0.0,
        }
    }

    /// Fold one signal; `elapsed` is wall time since the run started
    pub fn observe(&mut self, signal: &EngineSignal, elapsed: Duration) -> ProgressSnapshot {
        let mut raw_percent = None;
        match signal {
            EngineSignal::Timestamp(mark) => {
                if let Some(seconds) = parse_timemark(mark) {
                    self.processed_seconds = seconds;
                }
            }
            EngineSignal::Percent(p) if p.is_finite() => raw_percent = Some(*p),
            EngineSignal::Percent(_) => {}
        }

        let percent = if self.total_seconds > 0.0 {
            self.processed_seconds / self.total_seconds * 100.0
        } else {
            raw_percent.unwrap_or(self.last_percent)
        };
        let percent = percent.clamp(0.0, IN_FLIGHT_CAP).max(self.last_percent);
        self.last_percent = percent;

        let elapsed_secs = elapsed.as_secs_f64();
        let speed_factor = if elapsed_secs > 1.0 && self.processed_seconds > 0.0 {
            self.processed_seconds / elapsed_secs
        } else {
            0.0
        };

        let eta_seconds = if speed_factor > 0.0 && self.total_seconds > 0.0 {
            ((self.total_seconds - self.processed_seconds) / speed_factor).max(0.0)
        } else {
            0.0
        };

        // The merging label is cosmetic and never drives pipeline decisions
        let stage = if percent > 98.0 {
            Stage::Finalizing
        } else if !self.re_encode && speed_factor > self.high_throughput_speed {
            Stage::Merging
        } else {
            Stage::Transcoding
        };

        ProgressSnapshot {
            stage,
            percent,
            speed_factor,
            eta_seconds,
            current_seconds: self.processed_seconds,
            total_seconds: self.total_seconds,
        }
    }

    /// Snapshot sent before the engine reports anything
    pub fn started(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stage: Stage::Transcoding,
            percent: 0.0,
            speed_factor: 0.0,
            eta_seconds: self.total_seconds,
            current_seconds: 0.0,
            total_seconds: self.total_seconds,
        }
    }

    /// The terminal 100% snapshot
    pub fn complete(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stage: Stage::Finalizing,
            percent: 100.0,
            speed_factor: 0.0,
            eta_seconds: 0.0,
            current_seconds: self.total_seconds,
            total_seconds: self.total_seconds,
        }
    }
}
