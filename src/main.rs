//! audiomerge - merge audio files into a single audiobook
//!
//! Validates inputs, reports conflicts, and joins files either by direct
//! byte concatenation or through ffmpeg with generated chapters. Events are
//! printed to stdout as JSON lines; logs go to stderr and a log file.

mod audio;
mod core;
mod engine;
mod logging;
mod merge;
#[cfg(test)]
mod test_fixtures;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use crate::audio::{is_audio_file, NativeProber};
use crate::core::{
    EngineSettings, MergeError, MergeEvent, MergeOptions, MergeOutcome, MergeRequest,
    OutputFormat, ProgressSnapshot,
};
use crate::engine::{FfmpegRunner, FfprobeProber, MediaProber};
use crate::merge::{scan_files, MergeEngine, OperationContext, TempRegistry};

/// Command-line arguments for audiomerge
#[derive(Parser, Debug)]
#[command(name = "audiomerge")]
#[command(about = "Merge audio files into one chaptered audiobook")]
#[command(version)]
struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ffmpeg binary to use instead of searching for one
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Per-file probe timeout in seconds
    #[arg(long, global = true, env = "AUDIOMERGE_PROBE_TIMEOUT")]
    probe_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge files into one output, printing events as JSON lines
    Merge(MergeArgs),
    /// List stream details of audio files
    Scan {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show or set the ffmpeg binary
    Engine {
        /// Verify and remember this ffmpeg binary
        #[arg(long)]
        set: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Input files, in merge order
    #[arg(required_unless_present = "request")]
    files: Vec<PathBuf>,

    /// Output file
    #[arg(short, long, required_unless_present = "request")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatArg::Mp3)]
    format: FormatArg,

    /// Bitrate for re-encoding, e.g. 64k
    #[arg(long)]
    bitrate: Option<String>,

    /// Always re-encode at --bitrate
    #[arg(long)]
    custom_bitrate: bool,

    /// Drop unreadable files and resample mismatched ones instead of stopping
    #[arg(long)]
    auto_fix: bool,

    /// Read the whole request from a JSON file
    #[arg(long, conflicts_with_all = ["files", "output"])]
    request: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Mp3,
    M4b,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Mp3 => OutputFormat::Mp3,
            FormatArg::M4b => OutputFormat::M4b,
        }
    }
}

/// Print one event as a JSON line
fn emit(event: &MergeEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => log::error!("Failed to serialize event: {}", e),
    }
}

fn build_request(args: MergeArgs, settings: &EngineSettings) -> Result<MergeRequest, MergeError> {
    if let Some(path) = args.request {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| MergeError::io(format!("Failed to read {}", path.display()), e))?;
        return serde_json::from_str(&text).map_err(|e| MergeError::InvalidRequest(e.to_string()));
    }

    let output_path = args
        .output
        .ok_or_else(|| MergeError::InvalidRequest("no output path".to_string()))?;
    Ok(MergeRequest {
        files: args.files,
        output_path,
        options: MergeOptions {
            output_format: args.format.into(),
            bitrate: args
                .bitrate
                .unwrap_or_else(|| settings.default_bitrate.clone()),
            auto_fix: args.auto_fix,
            use_custom_bitrate: args.custom_bitrate,
        },
    })
}

/// ffprobe when installed, otherwise in-process probing
fn make_prober(ffprobe: Option<PathBuf>) -> Box<dyn MediaProber> {
    match ffprobe {
        Some(path) => Box::new(FfprobeProber::new(path)),
        None => Box::new(NativeProber),
    }
}

async fn run_merge(args: MergeArgs, settings: EngineSettings) -> ExitCode {
    let request = match build_request(args, &settings) {
        Ok(request) => request,
        Err(e) => {
            emit(&MergeEvent::Error {
                message: e.to_string(),
            });
            return ExitCode::FAILURE;
        }
    };

    for path in request.files.iter().filter(|p| !is_audio_file(p)) {
        log::warn!("{} does not look like an audio file", path.display());
    }

    let paths = match engine::locate(&settings) {
        Ok(paths) => paths,
        Err(e) => {
            log::error!("{}", e);
            emit(&MergeEvent::Error {
                message: e.to_string(),
            });
            return ExitCode::FAILURE;
        }
    };

    let merger = MergeEngine::new(
        make_prober(paths.ffprobe),
        FfmpegRunner::new(paths.ffmpeg),
        settings,
    );
    let ctx = OperationContext::new();

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressSnapshot>();
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            emit(&MergeEvent::from(&snapshot));
        }
    });

    let merge = merger.merge(&request, &ctx, tx);
    tokio::pin!(merge);
    let finished = tokio::select! {
        result = &mut merge => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            log::info!("Interrupted, cancelling merge");
            ctx.cancel();
            merge.await
        }
    };
    let _ = printer.await;

    match result {
        Ok(outcome) => {
            let code = match &outcome {
                MergeOutcome::Complete { .. } | MergeOutcome::CompleteWithWarning { .. } => {
                    ExitCode::SUCCESS
                }
                MergeOutcome::ConflictsDetected { .. } => ExitCode::from(2),
                MergeOutcome::Cancelled => ExitCode::from(130),
            };
            if let Some(event) = MergeEvent::from_outcome(outcome) {
                emit(&event);
            }
            code
        }
        Err(e) => {
            log::error!("Merge failed: {}", e);
            emit(&MergeEvent::Error {
                message: e.to_string(),
            });
            ExitCode::FAILURE
        }
    }
}

async fn run_scan(files: Vec<PathBuf>, json: bool, settings: EngineSettings) -> ExitCode {
    let ffprobe = match engine::locate(&settings) {
        Ok(paths) => paths.ffprobe,
        Err(e) => {
            log::warn!("{}; using in-process probing", e);
            None
        }
    };
    let prober = make_prober(ffprobe);
    let entries = scan_files(&prober, &files, settings.probe_timeout()).await;

    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                log::error!("Failed to serialize scan results: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for entry in &entries {
            println!("{}", entry.display_row());
        }
    }

    if entries.iter().any(|e| e.error) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_engine(set: Option<PathBuf>, mut settings: EngineSettings) -> ExitCode {
    if let Some(path) = set {
        if let Err(e) = engine::verify_engine(&path) {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
        settings.ffmpeg_path = Some(path);
        if let Err(e) = settings.save() {
            log::error!("Failed to save settings: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let paths = match engine::locate(&settings) {
        Ok(paths) => paths,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let version = engine::engine_version(&paths.ffmpeg).unwrap_or_else(|e| {
        log::warn!("{}", e);
        "unknown".to_string()
    });

    println!("ffmpeg:  {} ({})", paths.ffmpeg.display(), version);
    match &paths.ffprobe {
        Some(ffprobe) => println!("ffprobe: {}", ffprobe.display()),
        None => println!("ffprobe: not found (in-process probing)"),
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut settings = EngineSettings::load();
    if let Some(ffmpeg) = cli.ffmpeg {
        settings.ffmpeg_path = Some(ffmpeg);
    }
    if let Some(secs) = cli.probe_timeout {
        settings.probe_timeout_secs = secs;
    }

    let code = match cli.command {
        Command::Merge(args) => run_merge(args, settings).await,
        Command::Scan { files, json } => run_scan(files, json, settings).await,
        Command::Engine { set } => run_engine(set, settings),
    };

    let removed = TempRegistry::global().cleanup_all();
    if removed > 0 {
        log::debug!("Removed {} leftover temp files", removed);
    }
    code
}
