// Merge module - validation, conflict resolution, chapters and the two merge paths

pub mod binary;
pub mod chapters;
pub mod conflicts;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod strategy;
pub mod temp_files;
pub mod transcode;
pub mod validator;

pub use orchestrator::{MergeEngine, OperationContext};
pub use temp_files::TempRegistry;
pub use validator::scan_files;
