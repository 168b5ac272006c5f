//! File access used by layers.
//!
//! [`FsIo`] is the real filesystem. [`MemoryIo`] keeps files in memory with a
//! synthetic modification clock and counts reads, which makes reload
//! short-circuiting observable.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

/// Storage backend for [`LayeredSource`](crate::LayeredSource) files.
pub trait SourceIo: Send + Sync {
    /// Returns `true` if `path` exists and is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Returns the modification time of `path`.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Reads the whole file as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replaces the file contents, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The local filesystem.
///
/// Writes go to a hidden sibling file which is then renamed over the target,
/// so readers never observe a half-written file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsIo;

impl SourceIo for FsIo {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: SystemTime,
}

/// In-memory files with a monotonically increasing modification clock.
#[derive(Debug, Default)]
pub struct MemoryIo {
    files: Mutex<HashMap<PathBuf, MemoryFile>>,
    reads: AtomicUsize,
    clock: AtomicU64,
}

impl MemoryIo {
    /// Creates an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file, advancing its modification time.
    pub fn put(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.files.lock().insert(
            path.into(),
            MemoryFile {
                contents: contents.into(),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(tick),
            },
        );
    }

    /// Deletes a file.
    pub fn remove(&self, path: &Path) {
        self.files.lock().remove(path);
    }

    /// Returns the current contents of a file.
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().get(path).map(|f| f.contents.clone())
    }

    /// Number of successful and failed reads so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SourceIo for MemoryIo {
    fn is_file(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.files
            .lock()
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.contents(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.put(path, contents);
        Ok(())
    }
}
