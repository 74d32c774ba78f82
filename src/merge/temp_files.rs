//! Temporary artifact tracking
//!
//! Every raw concat output, concat list and chapter sidecar is registered
//! here when created and unregistered when removed. Whatever is still
//! registered at process teardown gets deleted by [`TempRegistry::cleanup_all`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::core::{MergeError, Result};

static GLOBAL: OnceLock<TempRegistry> = OnceLock::new();

/// Set of temp paths that must not outlive the process
#[derive(Debug, Clone, Default)]
pub struct TempRegistry {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static TempRegistry {
        GLOBAL.get_or_init(TempRegistry::new)
    }

    fn register(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.insert(path.to_path_buf());
        }
    }

    fn unregister(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.remove(path);
        }
    }

    #[cfg(test)]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .map(|paths| paths.contains(path))
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.paths.lock().map(|paths| paths.len()).unwrap_or(0)
    }

    /// Reserve a fresh path in the system temp dir, e.g. `audiomerge_concat_<uuid>.txt`
    pub fn create(&self, kind: &str, extension: &str) -> TempFile {
        self.create_in(&std::env::temp_dir(), kind, extension)
    }

    pub fn create_in(&self, dir: &Path, kind: &str, extension: &str) -> TempFile {
        let name = format!("audiomerge_{}_{}.{}", kind, uuid::Uuid::new_v4(), extension);
        let path = dir.join(name);
        self.register(&path);
        TempFile {
            path,
            registry: self.clone(),
            removed: false,
        }
    }

    /// Delete every registered path; returns how many files were removed
    pub fn cleanup_all(&self) -> usize {
        let paths: Vec<PathBuf> = match self.paths.lock() {
            Ok(mut paths) => paths.drain().collect(),
            Err(_) => return 0,
        };

        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!("Removed temp file {:?}", path);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove temp file {:?}: {}", path, e),
            }
        }
        removed
    }
}

/// A registered temp path, deleted on drop
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    registry: TempRegistry,
    removed: bool,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole file
    pub async fn write(&self, contents: &str, what: &str) -> Result<()> {
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| MergeError::io(format!("Failed to write {}", what), e))
    }

    /// Delete the file now and report failure
    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        self.registry.unregister(&self.path);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MergeError::io(
                format!("Failed to remove temp file {}", self.path.display()),
                e,
            )),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.registry.unregister(&self.path);
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove temp file {:?}: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_registers_unique_paths() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::new();
        let a = registry.create_in(dir.path(), "meta", "txt");
        let b = registry.create_in(dir.path(), "meta", "txt");
        assert_ne!(a.path(), b.path());
        assert!(registry.contains(a.path()));
        assert_eq!(registry.len(), 2);
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audiomerge_meta_"));
        assert!(name.ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_drop_deletes_and_unregisters() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::new();
        let file = registry.create_in(dir.path(), "concat", "txt");
        file.write("file 'a.mp3'\n", "concat list").await.unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_tolerates_never_written_file() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::new();
        let file = registry.create_in(dir.path(), "raw", "mp3");
        assert!(file.remove().is_ok());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_cleanup_all_removes_leftovers() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::new();
        let file = registry.create_in(dir.path(), "raw", "mp3");
        std::fs::write(file.path(), b"data").unwrap();
        let path = file.path().to_path_buf();
        // Simulate a guard that never ran, as on an abrupt exit
        std::mem::forget(file);

        assert_eq!(registry.cleanup_all(), 1);
        assert!(!path.exists());
        assert_eq!(registry.len(), 0);
    }
}
