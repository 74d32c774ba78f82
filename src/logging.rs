//! Logging configuration
//!
//! Logs go to stderr and to a file at
//! `<data_local_dir>/audiomerge/logs/audiomerge.log`. Stdout is reserved for
//! the JSON event stream.

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

const LOG_FILE: &str = "audiomerge.log";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Get the log directory path
pub fn get_log_directory() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("audiomerge").join("logs"))
}

fn terminal_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn log_config() -> simplelog::Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build()
}

/// Initialize terminal + file logging
///
/// Returns the path to the log file on success. Falls back to stderr only
/// when the file cannot be opened.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    let Some(log_dir) = get_log_directory() else {
        eprintln!("Warning: Could not determine log directory");
        init_terminal_only(verbose);
        return None;
    };

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_terminal_only(verbose);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE);

    // Rotate past 10MB
    if let Ok(metadata) = fs::metadata(&log_path) {
        if metadata.len() > MAX_LOG_SIZE {
            let backup_path = log_dir.join(format!("{}.old", LOG_FILE));
            let _ = fs::rename(&log_path, &backup_path);
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            init_terminal_only(verbose);
            return None;
        }
    };

    let config = log_config();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            terminal_level(verbose),
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, config, log_file),
    ];

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    log::debug!("=== audiomerge session started ===");
    log::debug!("Log file: {}", log_path.display());

    Some(log_path)
}

/// Stderr-only logging
fn init_terminal_only(verbose: bool) {
    let term_logger = TermLogger::new(
        terminal_level(verbose),
        log_config(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
    let _ = CombinedLogger::init(vec![term_logger]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_app_specific() {
        let Some(dir) = get_log_directory() else {
            return;
        };
        assert!(dir.ends_with("audiomerge/logs"));
    }

    #[test]
    fn test_verbose_lowers_terminal_level() {
        assert_eq!(terminal_level(false), LevelFilter::Info);
        assert_eq!(terminal_level(true), LevelFilter::Debug);
    }
}
