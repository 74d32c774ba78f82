//! Engine binary discovery and verification

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::{EngineSettings, MergeError, Result};

/// Environment variable that points at an engine binary
pub const ENGINE_ENV_VAR: &str = "AUDIOMERGE_FFMPEG";

fn binary_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

/// Paths of the engine and probe binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub ffmpeg: PathBuf,
    /// None when only the engine itself is installed
    pub ffprobe: Option<PathBuf>,
}

/// Find the engine binary
///
/// Lookup order: explicit override, `AUDIOMERGE_FFMPEG`, bundled
/// `resources/bin` next to the executable, then the system PATH.
pub fn find_ffmpeg(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            log::debug!("Using configured ffmpeg at {:?}", path);
            return Ok(path.to_path_buf());
        }
        return Err(MergeError::EngineNotFound(format!(
            "configured path {} does not exist",
            path.display()
        )));
    }

    if let Ok(env_path) = std::env::var(ENGINE_ENV_VAR) {
        let env_path = PathBuf::from(env_path);
        if env_path.exists() {
            log::debug!("Found ffmpeg via {}: {:?}", ENGINE_ENV_VAR, env_path);
            return Ok(env_path);
        }
        log::warn!(
            "{} points at {:?}, which does not exist",
            ENGINE_ENV_VAR,
            env_path
        );
    }

    if let Some(bundled) = bundled_binary("ffmpeg") {
        log::debug!("Found bundled ffmpeg at {:?}", bundled);
        return Ok(bundled);
    }

    which::which("ffmpeg").map_err(|_| {
        MergeError::EngineNotFound(format!(
            "ffmpeg not found on PATH; install it or set {}",
            ENGINE_ENV_VAR
        ))
    })
}

/// Find the probe binary, preferring the one installed next to the engine
pub fn find_ffprobe(ffmpeg: &Path, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }

    let sibling = ffmpeg.parent().map(|dir| dir.join(binary_name("ffprobe")));
    if let Some(sibling) = sibling.filter(|p| p.exists()) {
        return Some(sibling);
    }

    bundled_binary("ffprobe").or_else(|| which::which("ffprobe").ok())
}

/// Resolve both binaries from settings
pub fn locate(settings: &EngineSettings) -> Result<EnginePaths> {
    let ffmpeg = find_ffmpeg(settings.ffmpeg_path.as_deref())?;
    let ffprobe = find_ffprobe(&ffmpeg, settings.ffprobe_path.as_deref());
    if ffprobe.is_none() {
        log::warn!("ffprobe not found; falling back to in-process probing");
    }
    Ok(EnginePaths { ffmpeg, ffprobe })
}

/// Look for a binary shipped alongside the executable
fn bundled_binary(tool: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;
    let name = binary_name(tool);

    // macOS app bundle: Contents/MacOS/../Resources/bin/<tool>
    let bundle_path = exe_dir.join("..").join("Resources").join("bin").join(&name);
    if bundle_path.exists() {
        return Some(bundle_path);
    }

    let local_path = exe_dir.join("resources").join("bin").join(&name);
    local_path.exists().then_some(local_path)
}

/// Run `<path> -version` and return the first line of output
fn version_banner(path: &Path) -> Result<String> {
    let output = Command::new(path)
        .arg("-version")
        .output()
        .map_err(|e| MergeError::EngineSpawn {
            binary: path.to_path_buf(),
            source: e,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let banner = stdout
        .lines()
        .chain(stderr.lines())
        .find(|l| l.contains("ffmpeg version"))
        .map(str::to_string);

    banner.ok_or_else(|| MergeError::EngineNotFound(format!("{} is not ffmpeg", path.display())))
}

/// Check that a path is an executable ffmpeg build
pub fn verify_engine(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(MergeError::EngineNotFound(format!(
            "{} does not exist",
            path.display()
        )));
    }
    version_banner(path)?;
    log::info!("ffmpeg verified at: {:?}", path);
    Ok(())
}

/// Extract the version token from an `ffmpeg -version` banner
pub fn parse_version(banner: &str) -> String {
    banner
        .split_once("ffmpeg version ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(str::to_string)
        .unwrap_or_else(|| "Detected".to_string())
}

/// Version string of the engine at `path`
pub fn engine_version(path: &Path) -> Result<String> {
    version_banner(path).map(|banner| parse_version(&banner))
}
