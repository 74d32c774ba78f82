//! Conflict resolution
//!
//! Turns validator verdicts into either a conflict report (merge halts) or
//! the list of files to merge plus the target sample rate.

use std::collections::HashMap;

use crate::core::{Conflict, ConflictReason, ValidatedFile};

use super::validator::FileCheck;

/// Rate used when no valid file reports one
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Most frequent rate; ties go to the rate seen first
pub fn majority_sample_rate(rates: &[u32]) -> u32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for rate in rates {
        *counts.entry(*rate).or_insert(0) += 1;
    }

    let mut best: Option<(u32, usize)> = None;
    for rate in rates {
        let count = counts[rate];
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((*rate, count)),
        }
    }

    best.map(|(rate, _)| rate).unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Result of resolving one validation round
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Conflicts exist and auto-fix is off; nothing gets merged
    Halted {
        conflicts: Vec<Conflict>,
        target_rate: u32,
    },
    Proceed {
        files: Vec<ValidatedFile>,
        target_rate: u32,
        /// Names of inputs dropped under auto-fix, in input order
        skipped: Vec<String>,
        /// Some kept file differs from the target rate
        rate_mismatch: bool,
    },
}

/// Collect every conflict in one pass, then halt or auto-fix
pub fn resolve(checks: Vec<FileCheck>, auto_fix: bool) -> Resolution {
    let rates: Vec<u32> = checks
        .iter()
        .filter_map(|c| match c {
            FileCheck::Valid(file) => file.sample_rate,
            _ => None,
        })
        .collect();
    let target_rate = majority_sample_rate(&rates);

    let mut conflicts = Vec::new();
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    let mut rate_mismatch = false;

    for check in checks {
        match check {
            FileCheck::Corrupt { ref details, .. } => {
                conflicts.push(Conflict {
                    file_name: check.file_name(),
                    reason: ConflictReason::Corrupt,
                    details: details.clone(),
                });
                skipped.push(check.file_name());
            }
            FileCheck::Empty { .. } => {
                conflicts.push(Conflict {
                    file_name: check.file_name(),
                    reason: ConflictReason::Empty,
                    details: "Zero duration".to_string(),
                });
                skipped.push(check.file_name());
            }
            FileCheck::Valid(file) => {
                if file.sample_rate != Some(target_rate) {
                    let details = match file.sample_rate {
                        Some(rate) => format!("Rate: {}Hz", rate),
                        None => "Rate: unknown".to_string(),
                    };
                    conflicts.push(Conflict {
                        file_name: file.file_name(),
                        reason: ConflictReason::SampleRateMismatch,
                        details,
                    });
                    rate_mismatch = true;
                }
                files.push(file);
            }
        }
    }

    if !conflicts.is_empty() && !auto_fix {
        log::info!(
            "{} conflict(s) found, target rate {} Hz",
            conflicts.len(),
            target_rate
        );
        return Resolution::Halted {
            conflicts,
            target_rate,
        };
    }

    for name in &skipped {
        log::warn!("Skipping unusable file: {}", name);
    }
    if rate_mismatch {
        log::info!("Sample-rate mismatch, resampling to {} Hz", target_rate);
    }

    Resolution::Proceed {
        files,
        target_rate,
        skipped,
        rate_mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::valid_file;
    use std::path::PathBuf;

    #[test]
    fn test_majority_simple() {
        assert_eq!(majority_sample_rate(&[44100, 48000, 44100]), 44100);
        assert_eq!(majority_sample_rate(&[48000]), 48000);
    }

    #[test]
    fn test_majority_tie_goes_to_first_seen() {
        assert_eq!(majority_sample_rate(&[48000, 44100]), 48000);
        assert_eq!(majority_sample_rate(&[48000, 44100, 44100, 48000]), 48000);
        assert_eq!(majority_sample_rate(&[22050, 44100, 48000]), 22050);
    }

    #[test]
    fn test_majority_stable_under_order_preserving_permutation() {
        // Same first-occurrence order, different interleaving
        let a = majority_sample_rate(&[44100, 48000, 44100, 48000]);
        let b = majority_sample_rate(&[44100, 44100, 48000, 48000]);
        assert_eq!(a, b);
        assert_eq!(a, 44100);
    }

    #[test]
    fn test_majority_empty_defaults() {
        assert_eq!(majority_sample_rate(&[]), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_clean_set_proceeds() {
        let checks = vec![
            FileCheck::Valid(valid_file("/a/1.mp3", 10.0, 44100)),
            FileCheck::Valid(valid_file("/a/2.mp3", 20.0, 44100)),
        ];
        match resolve(checks, false) {
            Resolution::Proceed {
                files,
                target_rate,
                skipped,
                rate_mismatch,
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(target_rate, 44100);
                assert!(skipped.is_empty());
                assert!(!rate_mismatch);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_all_conflicts_reported_together() {
        let checks = vec![
            FileCheck::Valid(valid_file("/a/1.mp3", 10.0, 44100)),
            FileCheck::Corrupt {
                path: PathBuf::from("/a/2.mp3"),
                details: "Timeout".to_string(),
            },
            FileCheck::Empty {
                path: PathBuf::from("/a/3.mp3"),
            },
            FileCheck::Valid(valid_file("/a/4.mp3", 10.0, 44100)),
            FileCheck::Valid(valid_file("/a/5.mp3", 10.0, 48000)),
        ];
        let Resolution::Halted {
            conflicts,
            target_rate,
        } = resolve(checks, false)
        else {
            panic!("expected halt");
        };
        assert_eq!(target_rate, 44100);
        let reasons: Vec<_> = conflicts.iter().map(|c| c.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ConflictReason::Corrupt,
                ConflictReason::Empty,
                ConflictReason::SampleRateMismatch
            ]
        );
        assert_eq!(conflicts[0].details, "Timeout");
        assert_eq!(conflicts[2].file_name, "5.mp3");
        assert_eq!(conflicts[2].details, "Rate: 48000Hz");
    }

    #[test]
    fn test_auto_fix_drops_broken_and_keeps_mismatch() {
        let checks = vec![
            FileCheck::Valid(valid_file("/a/1.mp3", 10.0, 44100)),
            FileCheck::Corrupt {
                path: PathBuf::from("/a/2.mp3"),
                details: "Corrupt".to_string(),
            },
            FileCheck::Valid(valid_file("/a/3.mp3", 10.0, 22050)),
            FileCheck::Valid(valid_file("/a/4.mp3", 10.0, 44100)),
        ];
        let Resolution::Proceed {
            files,
            skipped,
            rate_mismatch,
            target_rate,
        } = resolve(checks, true)
        else {
            panic!("expected proceed");
        };
        assert_eq!(target_rate, 44100);
        assert_eq!(skipped, vec!["2.mp3".to_string()]);
        assert!(rate_mismatch);
        let names: Vec<_> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["1.mp3", "3.mp3", "4.mp3"]);
    }

    #[test]
    fn test_unknown_rate_is_mismatch() {
        let mut unknown = valid_file("/a/2.mp3", 10.0, 44100);
        unknown.sample_rate = None;
        let checks = vec![
            FileCheck::Valid(valid_file("/a/1.mp3", 10.0, 44100)),
            FileCheck::Valid(unknown),
        ];
        let Resolution::Halted { conflicts, .. } = resolve(checks, false) else {
            panic!("expected halt");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].details, "Rate: unknown");
    }

    #[test]
    fn test_no_known_rates_uses_default() {
        let mut file = valid_file("/a/1.mp3", 10.0, 44100);
        file.sample_rate = None;
        let Resolution::Halted { target_rate, .. } = resolve(vec![FileCheck::Valid(file)], false)
        else {
            panic!("expected halt");
        };
        assert_eq!(target_rate, DEFAULT_SAMPLE_RATE);
    }
}
