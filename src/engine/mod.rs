// Engine module - locating, probing with and running the external ffmpeg toolchain

mod locate;
mod probe;
mod runner;

pub use locate::{engine_version, locate, verify_engine};
pub use probe::{FfprobeProber, MediaProber, ProbeReport};
pub use runner::{EngineRunner, EngineSignal, FfmpegRunner, InputSpec, Invocation, RunOutcome};
