mod file_system;
mod memory;

pub use file_system::{FileStat, FileSystem, OsFileSystem};
pub use memory::MemoryFileSystem;
