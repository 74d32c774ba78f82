//! Standard path: engine-driven concat with a chapter sidecar
//!
//! Input 0 is the concat list, input 1 the FFMETADATA chapter sidecar and
//! input 2 the first file, used only for global tags and cover art.

use std::path::Path;
use std::time::Instant;

use crate::core::{MergeError, MergePlan, OutputFormat, Result, ValidatedFile};
use crate::engine::{EngineRunner, InputSpec, Invocation, RunOutcome};

use super::chapters::{build_chapters, encode_chapter_sidecar};
use super::pipeline::Pipeline;
use super::progress::ProgressTracker;

/// Quote a path for a concat-demuxer `file` directive
fn concat_entry(path: &Path) -> String {
    let mut normalized = path.to_string_lossy().into_owned();
    if std::path::MAIN_SEPARATOR == '\\' {
        normalized = normalized.replace('\\', "/");
    }
    format!("file '{}'", normalized.replace('\'', "'\\''"))
}

/// One `file '<path>'` line per input, in merge order
pub fn build_concat_list(files: &[ValidatedFile]) -> String {
    files
        .iter()
        .map(|f| concat_entry(&f.path))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_all(options: &mut Vec<String>, args: &[&str]) {
    options.extend(args.iter().map(|s| s.to_string()));
}

/// Engine arguments for the standard path
pub fn build_transcode_invocation(
    plan: &MergePlan,
    concat_list: &Path,
    metadata: &Path,
    output: &Path,
) -> Result<Invocation> {
    let tag_source = plan.tag_source().ok_or(MergeError::NoValidFiles)?;

    let mut options = Vec::new();
    push_all(&mut options, &["-map", "0:a", "-map_chapters", "1", "-map_metadata", "2"]);

    if tag_source.has_cover_art {
        push_all(
            &mut options,
            &["-map", "2:v", "-c:v", "copy", "-disposition:v:0", "attached_pic"],
        );
    }

    if plan.re_encode {
        push_all(&mut options, &["-c:a", plan.output_format.encoder()]);
        push_all(&mut options, &["-b:a", plan.bitrate.as_str()]);
        options.push("-ar".to_string());
        options.push(plan.target_sample_rate.to_string());
    } else {
        push_all(&mut options, &["-c:a", "copy"]);
    }

    push_all(&mut options, &["-f", plan.output_format.muxer()]);
    match plan.output_format {
        OutputFormat::M4b => push_all(&mut options, &["-movflags", "+faststart"]),
        OutputFormat::Mp3 => push_all(&mut options, &["-id3v2_version", "3"]),
    }

    Ok(Invocation {
        inputs: vec![
            InputSpec::new(concat_list).with_options(&["-f", "concat", "-safe", "0"]),
            InputSpec::new(metadata).with_options(&["-f", "ffmetadata"]),
            InputSpec::new(&tag_source.path),
        ],
        output_options: options,
        output: output.to_path_buf(),
    })
}

/// Write both sidecars, run the engine and report progress
pub async fn transcode<R: EngineRunner + ?Sized>(
    pipeline: &Pipeline<'_, R>,
    plan: &MergePlan,
    output: &Path,
) -> Result<RunOutcome> {
    let chapters = build_chapters(&plan.ordered_files);
    let metadata = pipeline.temps.create("meta", "txt");
    metadata
        .write(&encode_chapter_sidecar(&chapters), "chapter sidecar")
        .await?;

    let concat_list = pipeline.temps.create("concat", "txt");
    concat_list
        .write(&build_concat_list(&plan.ordered_files), "concat list")
        .await?;

    let invocation = build_transcode_invocation(plan, concat_list.path(), metadata.path(), output)?;
    log::info!(
        "Transcoding {} files to {:?} ({}, re-encode: {})",
        plan.ordered_files.len(),
        output,
        plan.output_format.extension(),
        plan.re_encode
    );

    let mut tracker = ProgressTracker::new(
        plan.total_duration(),
        plan.re_encode,
        pipeline.settings.high_throughput_speed,
    );
    pipeline.report(tracker.started());

    let started = Instant::now();
    let outcome = pipeline
        .run_engine(&invocation, |signal| {
            pipeline.report(tracker.observe(signal, started.elapsed()));
        })
        .await;

    for sidecar in [metadata, concat_list] {
        if let Err(e) = sidecar.remove() {
            log::warn!("{}", e);
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::valid_file;

    fn plan(files: Vec<ValidatedFile>, format: OutputFormat, re_encode: bool) -> MergePlan {
        MergePlan {
            ordered_files: files,
            target_sample_rate: 44100,
            output_format: format,
            bitrate: "96k".to_string(),
            custom_bitrate: false,
            re_encode,
        }
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let files = vec![
            valid_file("/books/It's Here/01.mp3", 1.0, 44100),
            valid_file("/books/02.mp3", 1.0, 44100),
        ];
        assert_eq!(
            build_concat_list(&files),
            "file '/books/It'\\''s Here/01.mp3'\nfile '/books/02.mp3'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_kept_on_unix() {
        let files = vec![valid_file("/books/a\\b.mp3", 1.0, 44100)];
        assert_eq!(build_concat_list(&files), "file '/books/a\\b.mp3'");
    }

    #[cfg(windows)]
    #[test]
    fn test_windows_separators_are_normalized() {
        let files = vec![valid_file("C:\\Audio\\02.mp3", 1.0, 44100)];
        assert_eq!(build_concat_list(&files), "file 'C:/Audio/02.mp3'");
    }

    #[test]
    fn test_copy_invocation_for_m4b() {
        let mut first = valid_file("/in/01.m4a", 10.0, 44100);
        first.has_cover_art = true;
        let p = plan(vec![first, valid_file("/in/02.m4a", 10.0, 44100)], OutputFormat::M4b, false);
        let inv = build_transcode_invocation(
            &p,
            Path::new("/tmp/c.txt"),
            Path::new("/tmp/m.txt"),
            Path::new("/out/book.m4b"),
        )
        .unwrap();

        assert_eq!(inv.inputs.len(), 3);
        assert_eq!(inv.inputs[0].options, vec!["-f", "concat", "-safe", "0"]);
        assert_eq!(inv.inputs[1].options, vec!["-f", "ffmetadata"]);
        assert_eq!(inv.inputs[2].path, Path::new("/in/01.m4a"));
        assert!(inv.has_option("-map", "0:a"));
        assert!(inv.has_option("-map_chapters", "1"));
        assert!(inv.has_option("-map_metadata", "2"));
        assert!(inv.has_option("-map", "2:v"));
        assert!(inv.has_option("-disposition:v:0", "attached_pic"));
        assert!(inv.has_option("-c:a", "copy"));
        assert!(inv.has_option("-movflags", "+faststart"));
        assert!(inv.has_option("-f", "mp4"));
        assert!(!inv.output_options.contains(&"-ar".to_string()));
    }

    #[test]
    fn test_re_encode_invocation_for_mp3() {
        let p = plan(vec![valid_file("/in/01.mp3", 10.0, 44100)], OutputFormat::Mp3, true);
        let inv = build_transcode_invocation(
            &p,
            Path::new("/tmp/c.txt"),
            Path::new("/tmp/m.txt"),
            Path::new("/out/book.mp3"),
        )
        .unwrap();

        assert!(inv.has_option("-c:a", "libmp3lame"));
        assert!(inv.has_option("-b:a", "96k"));
        assert!(inv.has_option("-ar", "44100"));
        assert!(inv.has_option("-id3v2_version", "3"));
        assert!(!inv.has_option("-map", "2:v"));
        assert!(!inv.has_option("-movflags", "+faststart"));
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let p = plan(Vec::new(), OutputFormat::Mp3, false);
        let result = build_transcode_invocation(
            &p,
            Path::new("/tmp/c.txt"),
            Path::new("/tmp/m.txt"),
            Path::new("/out/book.mp3"),
        );
        assert!(matches!(result, Err(MergeError::NoValidFiles)));
    }
}
