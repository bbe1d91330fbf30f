//! Read-only filesystem abstraction.
//!
//! The core never writes project files. Everything it reads goes through a
//! [`FileSystem`] so hosts can substitute virtual files (editors, tests).

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Minimal file metadata the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Open/read/stat access to project files, plus directory enumeration.
pub trait FileSystem: Send + Sync {
    /// Open a file for incremental reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Enumerate every entry below `root`, depth first, in sorted order.
    ///
    /// The iterator yields errors for unreadable entries instead of stopping.
    fn walk(&self, root: &Path) -> Box<dyn Iterator<Item = io::Result<PathBuf>> + Send>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        Ok(FileStat {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn walk(&self, root: &Path) -> Box<dyn Iterator<Item = io::Result<PathBuf>> + Send> {
        let iter = walkdir::WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| match entry {
                Ok(entry) => Ok(entry.into_path()),
                Err(err) => Err(io::Error::other(err.to_string())),
            });
        Box::new(iter)
    }
}
