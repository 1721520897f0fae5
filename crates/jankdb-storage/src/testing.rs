//! Fault-injecting filesystem for unit tests.

use std::{
    io,
    path::{Path, PathBuf},
};

use jankdb_core::{FileStat, FileSystem, MemoryFileSystem};

/// Delegates to an in-memory tree, failing selected operations.
#[derive(Debug, Clone, Default)]
pub(crate) struct Faulty {
    pub(crate) inner: MemoryFileSystem,
    fail_writes_to: Option<&'static str>,
    fail_stat: bool,
    fail_renames_to: Option<&'static str>,
}

impl Faulty {
    pub(crate) fn failing_writes(inner: MemoryFileSystem) -> Self {
        Self::failing_writes_to(inner, "")
    }

    /// Fail writes whose path ends with `suffix`.
    pub(crate) fn failing_writes_to(inner: MemoryFileSystem, suffix: &'static str) -> Self {
        Self {
            inner,
            fail_writes_to: Some(suffix),
            ..Self::default()
        }
    }

    pub(crate) fn failing_stat(inner: MemoryFileSystem) -> Self {
        Self {
            inner,
            fail_stat: true,
            ..Self::default()
        }
    }

    /// Fail renames whose destination ends with `suffix`.
    pub(crate) fn failing_renames_to(inner: MemoryFileSystem, suffix: &'static str) -> Self {
        Self {
            inner,
            fail_renames_to: Some(suffix),
            ..Self::default()
        }
    }
}

impl FileSystem for Faulty {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        if let Some(suffix) = self.fail_writes_to {
            if path.to_string_lossy().ends_with(suffix) {
                return Err(io::Error::other("disk full"));
            }
        }
        self.inner.write_file(path, data, mode)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        if self.fail_stat {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        self.inner.metadata(path)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.inner.create_dir_all(path, mode)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(suffix) = self.fail_renames_to {
            if to.to_string_lossy().ends_with(suffix) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
        }
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }
}
