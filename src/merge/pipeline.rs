//! Shared plumbing for one merge run

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{EngineSettings, ProgressSnapshot, Result};
use crate::engine::{EngineRunner, EngineSignal, Invocation, RunOutcome};

use super::temp_files::TempRegistry;

/// Handles every merge path needs: the engine, settings, temp tracking,
/// cancellation and the progress channel
pub struct Pipeline<'a, R: EngineRunner + ?Sized> {
    pub runner: &'a R,
    pub settings: &'a EngineSettings,
    pub temps: &'a TempRegistry,
    pub cancel: &'a CancellationToken,
    pub progress: &'a mpsc::UnboundedSender<ProgressSnapshot>,
    /// Highest percent sent so far, as `f64` bits
    floor: AtomicU64,
}

impl<'a, R: EngineRunner + ?Sized> Pipeline<'a, R> {
    pub fn new(
        runner: &'a R,
        settings: &'a EngineSettings,
        temps: &'a TempRegistry,
        cancel: &'a CancellationToken,
        progress: &'a mpsc::UnboundedSender<ProgressSnapshot>,
    ) -> Self {
        Self {
            runner,
            settings,
            temps,
            cancel,
            progress,
            floor: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    /// Send a snapshot, never letting percent drop below an earlier one
    ///
    /// A fallback run starts its own tracker at zero; the floor keeps the
    /// merge-wide figure where the failed fast path left it.
    pub fn report(&self, mut snapshot: ProgressSnapshot) {
        let previous = self
            .floor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some(f64::from_bits(bits).max(snapshot.percent).to_bits())
            })
            .map_or(0.0, f64::from_bits);
        snapshot.percent = snapshot.percent.max(previous);
        // A closed channel only means nobody is listening
        let _ = self.progress.send(snapshot);
    }

    /// Run the engine, handing each signal to `on_signal` as it arrives
    pub async fn run_engine<F>(
        &self,
        invocation: &Invocation,
        mut on_signal: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(&EngineSignal) + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = self.runner.run(invocation, tx, self.cancel);
        tokio::pin!(run);

        loop {
            tokio::select! {
                result = &mut run => {
                    while let Ok(signal) = rx.try_recv() {
                        on_signal(&signal);
                    }
                    return result;
                }
                Some(signal) = rx.recv() => on_signal(&signal),
            }
        }
    }
}
