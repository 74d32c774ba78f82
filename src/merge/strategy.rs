//! Merge strategy selection

use crate::audio::supports_raw_concat;
use crate::core::{MergePlan, OutputFormat, ValidatedFile};

/// How a plan's files get joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Append encoded bytes, then repair headers in one engine pass
    BinaryConcat,
    /// Engine-driven concat with chapters and optional re-encoding
    Transcode,
}

/// Whether the output must be re-encoded rather than stream-copied
///
/// # Arguments
/// * `files` - Validated files in merge order
/// * `format` - Requested output container
/// * `custom_bitrate` - The caller asked for an explicit bitrate
/// * `rate_mismatch` - Some file differs from the target sample rate
pub fn requires_re_encode(
    files: &[ValidatedFile],
    format: OutputFormat,
    custom_bitrate: bool,
    rate_mismatch: bool,
) -> bool {
    if custom_bitrate || rate_mismatch {
        return true;
    }

    // Copy needs one shared codec the container can hold
    let Some(first) = files.first() else {
        return false;
    };
    let codec = first.codec.to_lowercase();
    let uniform = files.iter().all(|f| f.codec.eq_ignore_ascii_case(&codec));
    !(uniform && format.accepts_codec(&codec))
}

/// Pick the fast path when the plan allows it
pub fn select_strategy(plan: &MergePlan) -> MergeStrategy {
    if plan.output_format != OutputFormat::Mp3 || plan.custom_bitrate || plan.re_encode {
        return MergeStrategy::Transcode;
    }

    let Some(first) = plan.ordered_files.first() else {
        return MergeStrategy::Transcode;
    };
    let extension = first.extension();
    let uniform = plan
        .ordered_files
        .iter()
        .all(|f| f.extension() == extension);

    if uniform && supports_raw_concat(&extension) {
        MergeStrategy::BinaryConcat
    } else {
        MergeStrategy::Transcode
    }
}
