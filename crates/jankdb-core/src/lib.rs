//! Core abstractions for jankdb: the filesystem contract the store is built on.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod fs;

pub use fs::{FileStat, FileSystem, MemoryFileSystem, OsFileSystem};
