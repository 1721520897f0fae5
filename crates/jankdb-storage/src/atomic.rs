//! Crash-safe file replacement: write `.tmp`, optional `.bak` copy, rename over.
//!
//! At every observable point `final_path` holds either the previous or the new
//! complete content. A crash between the temp write and the rename leaves an
//! orphan `.tmp` behind; it is overwritten by the next save, never cleaned up.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use jankdb_core::FileSystem;
use tracing::debug;

use crate::error::StoreError;

pub const TMP_SUFFIX: &str = ".tmp";
pub const BAK_SUFFIX: &str = ".bak";

/// Owner-only read/write.
pub const FILE_MODE: u32 = 0o600;

/// Append `suffix` to the file name of `path` (`data.json` -> `data.json.bak`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Replace `final_path` with `data`.
///
/// The new content is written to `<final_path>.tmp` first. With
/// `enable_backup`, the current file is then copied to `<final_path>.bak`; if
/// that copy fails the temp file is discarded and `final_path` is not touched.
/// `final_path` is never missing while a previous version exists.
pub fn atomic_write_file<F: FileSystem + ?Sized>(
    fs: &F,
    final_path: &Path,
    data: &[u8],
    enable_backup: bool,
) -> Result<(), StoreError> {
    let tmp_path = with_suffix(final_path, TMP_SUFFIX);

    fs.write_file(&tmp_path, data, FILE_MODE)
        .map_err(|e| StoreError::io("write temp file", &tmp_path, e))?;

    if enable_backup {
        if let Err(err) = back_up(fs, final_path) {
            if let Err(cleanup) = fs.remove_file(&tmp_path) {
                debug!(tmp = %tmp_path.display(), "failed to discard temp file: {cleanup}");
            }
            return Err(err);
        }
    }

    fs.rename(&tmp_path, final_path)
        .map_err(|e| StoreError::io("rename temp file onto", final_path, e))?;

    debug!(path = %final_path.display(), bytes = data.len(), "replaced file");
    Ok(())
}

/// Copy the current file to `<final_path>.bak`, leaving the original in place.
fn back_up<F: FileSystem + ?Sized>(fs: &F, final_path: &Path) -> Result<(), StoreError> {
    let previous = match fs.read_file(final_path) {
        Ok(bytes) => bytes,
        Err(err) if fs.is_not_found(&err) => return Ok(()),
        Err(e) => return Err(StoreError::io("read for backup", final_path, e)),
    };

    let bak_path = with_suffix(final_path, BAK_SUFFIX);
    fs.write_file(&bak_path, &previous, FILE_MODE)
        .map_err(|e| StoreError::io("back up", &bak_path, e))?;
    debug!(backup = %bak_path.display(), "copied previous file to backup");
    Ok(())
}

#[cfg(test)]
mod tests {
    use jankdb_core::MemoryFileSystem;

    use super::*;
    use crate::testing::Faulty;

    fn seeded(content: &[u8]) -> MemoryFileSystem {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new("/data"), 0o755).expect("mkdir");
        fs.write_file(Path::new("/data/state.json"), content, FILE_MODE)
            .expect("seed");
        fs
    }

    #[test]
    fn suffix_is_appended_to_file_name() {
        assert_eq!(
            with_suffix(Path::new("/a/data.json"), BAK_SUFFIX),
            PathBuf::from("/a/data.json.bak")
        );
    }

    #[test]
    fn writes_new_file_with_owner_only_mode() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new("/data"), 0o755).expect("mkdir");
        let path = Path::new("/data/state.json");

        atomic_write_file(&fs, path, b"v1", false).expect("write");

        assert_eq!(fs.read_file(path).expect("read"), b"v1");
        assert_eq!(fs.file_mode(path), Some(0o600));
        let tmp = fs.metadata(&with_suffix(path, TMP_SUFFIX)).expect_err("tmp renamed");
        assert!(fs.is_not_found(&tmp));
    }

    #[test]
    fn backup_keeps_previous_content() {
        let fs = seeded(b"v1");
        let path = Path::new("/data/state.json");

        atomic_write_file(&fs, path, b"v2", true).expect("write");

        assert_eq!(fs.read_file(path).expect("read"), b"v2");
        assert_eq!(
            fs.read_file(&with_suffix(path, BAK_SUFFIX)).expect("read bak"),
            b"v1"
        );
    }

    #[test]
    fn backup_is_skipped_when_disabled() {
        let fs = seeded(b"v1");
        let path = Path::new("/data/state.json");

        atomic_write_file(&fs, path, b"v2", false).expect("write");

        let err = fs
            .metadata(&with_suffix(path, BAK_SUFFIX))
            .expect_err("no backup");
        assert!(fs.is_not_found(&err));
    }

    #[test]
    fn failed_temp_write_leaves_final_file_untouched() {
        let fs = Faulty::failing_writes(seeded(b"v1"));
        let path = Path::new("/data/state.json");

        let err = atomic_write_file(&fs, path, b"v2", false).expect_err("write fails");
        assert!(matches!(err, StoreError::Io { op: "write temp file", .. }));
        assert_eq!(fs.read_file(path).expect("read"), b"v1");
    }

    #[test]
    fn failed_temp_write_with_backup_keeps_final_file() {
        let fs = Faulty::failing_writes(seeded(b"v1"));
        let path = Path::new("/data/state.json");

        let err = atomic_write_file(&fs, path, b"v2", true).expect_err("write fails");
        assert!(matches!(err, StoreError::Io { op: "write temp file", .. }));
        assert_eq!(fs.read_file(path).expect("final still present"), b"v1");
        let bak = fs
            .metadata(&with_suffix(path, BAK_SUFFIX))
            .expect_err("no backup taken");
        assert!(fs.is_not_found(&bak));
    }

    #[test]
    fn failed_backup_leaves_final_file_and_discards_temp() {
        let fs = Faulty::failing_writes_to(seeded(b"v1"), BAK_SUFFIX);
        let path = Path::new("/data/state.json");

        let err = atomic_write_file(&fs, path, b"v2", true).expect_err("backup fails");
        assert!(matches!(err, StoreError::Io { op: "back up", .. }));
        assert_eq!(fs.read_file(path).expect("read"), b"v1");
        let tmp = fs
            .metadata(&with_suffix(path, TMP_SUFFIX))
            .expect_err("temp file discarded");
        assert!(fs.is_not_found(&tmp));
    }

    #[test]
    fn backup_is_skipped_for_first_write() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new("/data"), 0o755).expect("mkdir");
        let path = Path::new("/data/state.json");

        atomic_write_file(&fs, path, b"v1", true).expect("write");

        assert_eq!(fs.read_file(path).expect("read"), b"v1");
        let bak = fs
            .metadata(&with_suffix(path, BAK_SUFFIX))
            .expect_err("nothing to back up");
        assert!(fs.is_not_found(&bak));
    }

    #[test]
    fn failed_final_rename_leaves_orphan_temp() {
        let fs = Faulty::failing_renames_to(seeded(b"v1"), "state.json");
        let path = Path::new("/data/state.json");

        let err = atomic_write_file(&fs, path, b"v2", false).expect_err("rename fails");
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(fs.read_file(path).expect("read"), b"v1");
        assert_eq!(
            fs.read_file(&with_suffix(path, TMP_SUFFIX)).expect("orphan"),
            b"v2"
        );
    }
}
