//! Core types shared across the application
//!
//! This module contains:
//! - The merge data model (requests, plans, conflicts, progress)
//! - Error types
//! - Persistent engine settings
//! - Display formatting helpers

mod error;
mod format;
mod settings;
mod types;

pub use error::{MergeError, ProbeError, Result};
pub use format::{format_duration, format_size};
pub use settings::EngineSettings;
pub use types::{
    CandidateFile, Chapter, Conflict, ConflictReason, MergeEvent, MergeOptions, MergeOutcome,
    MergePlan, MergeRequest, OutputFormat, ProgressSnapshot, Stage, ValidatedFile,
};
pub(crate) use types::file_name_of;
