// Audio module - extension detection and in-process stream inspection

pub mod detection;
pub mod metadata;

pub use detection::{is_audio_file, supports_raw_concat};
pub use metadata::NativeProber;
