//! Destinations for encoded tiles.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::ExtractError;

/// Where the pipeline puts directories and encoded files.
pub trait TileSink {
    /// Create a directory and its parents. Existing directories are fine.
    ///
    /// # Errors
    ///
    /// Returns `Path` when the directory cannot be created.
    fn create_dir(&mut self, dir: &Path) -> Result<(), ExtractError>;

    /// Write an encoded file, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `Path` when the parent directory is missing or not writable,
    /// `Io` for any other write failure.
    fn write_file(&mut self, path: &Path, data: &Bytes) -> Result<(), ExtractError>;
}

// =============================================================================
// File System
// =============================================================================

/// Writes to the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTileSink;

impl TileSink for FileTileSink {
    fn create_dir(&mut self, dir: &Path) -> Result<(), ExtractError> {
        fs::create_dir_all(dir).map_err(|e| ExtractError::Path {
            path: dir.display().to_string(),
            message: e.to_string(),
        })
    }

    fn write_file(&mut self, path: &Path, data: &Bytes) -> Result<(), ExtractError> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent.filter(|p| !p.is_dir()) {
            return Err(ExtractError::Path {
                path: dir.display().to_string(),
                message: "directory does not exist".to_string(),
            });
        }

        fs::write(path, data).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ExtractError::Path {
                path: parent.unwrap_or(path).display().to_string(),
                message: e.to_string(),
            },
            _ => ExtractError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            },
        })?;
        debug!(path = %path.display(), bytes = data.len(), "Wrote file");
        Ok(())
    }
}

// =============================================================================
// In Memory
// =============================================================================

/// Keeps everything in memory. Writing into a directory that was never
/// created is a `Path` error, as on disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryTileSink {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Bytes>,
}

impl MemoryTileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dirs(&self) -> &BTreeSet<PathBuf> {
        &self.dirs
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, Bytes> {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// Files directly inside `dir`.
    pub fn files_in<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = &'a Path> + 'a {
        self.files
            .keys()
            .filter(move |p| p.parent() == Some(dir))
            .map(PathBuf::as_path)
    }
}

impl TileSink for MemoryTileSink {
    fn create_dir(&mut self, dir: &Path) -> Result<(), ExtractError> {
        for ancestor in dir.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            self.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn write_file(&mut self, path: &Path, data: &Bytes) -> Result<(), ExtractError> {
        let parent = path.parent().unwrap_or(Path::new(""));
        if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) {
            return Err(ExtractError::Path {
                path: parent.display().to_string(),
                message: "directory does not exist".to_string(),
            });
        }
        self.files.insert(path.to_path_buf(), data.clone());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
