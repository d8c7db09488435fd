// src/fs/mod.rs

//! Filesystem seam used by the supervisor for backing files.
//!
//! Backing sources are written, checked, listed and deleted through
//! [`FileSystem`] so deployment and recovery logic can be exercised against
//! [`mock::MockFileSystem`]. The snapshot store does its own atomic writes
//! and does not go through this trait.

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{BotkeeperError, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Create or truncate `path` (creating parent directories) and write `contents`.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// One spelling per existing path: `.`/`..` resolved, symlinks followed.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| BotkeeperError::io(format!("creating dir {:?}", parent), e))?;
            }
        }
        let mut file = fs::File::create(path)
            .map_err(|e| BotkeeperError::io(format!("creating file {:?}", path), e))?;
        file.write_all(contents)
            .map_err(|e| BotkeeperError::io(format!("writing to file {:?}", path), e))?;
        file.sync_all()
            .map_err(|e| BotkeeperError::io(format!("syncing file {:?}", path), e))?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| BotkeeperError::io(format!("reading file {:?}", path), e))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| BotkeeperError::io(format!("removing file {:?}", path), e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .map_err(|e| BotkeeperError::io(format!("removing dir {:?}", path), e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| BotkeeperError::io(format!("creating dir {:?}", path), e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let context = || format!("reading dir {:?}", path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| BotkeeperError::io(context(), e))? {
            let entry = entry.map_err(|e| BotkeeperError::io(context(), e))?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path)
            .map_err(|e| BotkeeperError::io(format!("resolving path {:?}", path), e))
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    match fs.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found_io() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively collect every regular file under `root`, sorted by path.
///
/// Hidden entries (names starting with `.`, e.g. a `.git` directory) are
/// skipped.
pub fn walk_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs.read_dir(&dir)? {
            let hidden = entry
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if fs.is_dir(&entry) {
                stack.push(entry);
            } else if fs.is_file(&entry) {
                files.push(entry);
            }
        }
    }

    files.sort();
    Ok(files)
}
