use std::{
    fs::{self, DirBuilder, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::trace;

/// Subset of file metadata the store cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub is_dir: bool,
}

/// Primitive durable storage operations consumed by the store.
///
/// Implementations are plain pass-throughs; callers attach path and operation
/// context to any error they get back.
pub trait FileSystem: Send + Sync {
    /// Read the whole file into memory.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `data` to it. `mode` applies when the
    /// file is created.
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    fn metadata(&self, path: &Path) -> io::Result<FileStat>;

    /// Create `path` and all missing parents.
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Replace `to` with `from`. Expected to be atomic within one directory.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// List the entries directly under `path`, sorted.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Whether `err` means the path does not exist.
    fn is_not_found(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::NotFound
    }
}

/// `FileSystem` backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(path)?;
        file.write_all(data)?;
        // Flush to disk before the caller renames over the destination.
        file.sync_all()?;
        trace!(path = %path.display(), bytes = data.len(), "wrote file");
        Ok(())
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        Ok(FileStat {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)?;
        trace!(from = %from.display(), to = %to.display(), "renamed file");
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}
