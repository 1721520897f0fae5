use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use super::file_system::{FileStat, FileSystem};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, mode: u32 },
    Dir,
}

/// In-memory filesystem for tests and embedding.
/// Clones share the same tree, so two stores can observe each other's writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    inner: Arc<Mutex<BTreeMap<PathBuf, Node>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission bits a file was created with, if it exists.
    pub fn file_mode(&self, path: &Path) -> Option<u32> {
        let tree = self.lock().ok()?;
        match tree.get(path) {
            Some(Node::File { mode, .. }) => Some(*mode),
            _ => None,
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.inner
            .lock()
            .map_err(|err| io::Error::other(format!("lock poisoned: {err}")))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.parent().is_none()
}

fn require_parent(tree: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !is_root(parent) => match tree.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", parent.display()),
            )),
            None => Err(not_found(parent)),
        },
        _ => Ok(()),
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let tree = self.lock()?;
        match tree.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut tree = self.lock()?;
        require_parent(&tree, path)?;
        match tree.get_mut(path) {
            Some(Node::File { data: existing, .. }) => {
                *existing = data.to_vec();
            }
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("is a directory: {}", path.display()),
                ))
            }
            None => {
                tree.insert(
                    path.to_path_buf(),
                    Node::File {
                        data: data.to_vec(),
                        mode,
                    },
                );
            }
        }
        Ok(())
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        let tree = self.lock()?;
        match tree.get(path) {
            Some(Node::File { data, .. }) => Ok(FileStat {
                len: data.len() as u64,
                is_dir: false,
            }),
            Some(Node::Dir) => Ok(FileStat {
                len: 0,
                is_dir: true,
            }),
            None if is_root(path) => Ok(FileStat {
                len: 0,
                is_dir: true,
            }),
            None => Err(not_found(path)),
        }
    }

    fn create_dir_all(&self, path: &Path, _mode: u32) -> io::Result<()> {
        let mut tree = self.lock()?;
        for ancestor in path.ancestors().filter(|p| !is_root(p)) {
            if let Some(Node::File { .. }) = tree.get(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {}", ancestor.display()),
                ));
            }
        }
        for ancestor in path.ancestors().filter(|p| !is_root(p)) {
            tree.insert(ancestor.to_path_buf(), Node::Dir);
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.lock()?;
        require_parent(&tree, to)?;
        if let Some(Node::Dir) = tree.get(to) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", to.display()),
            ));
        }
        match tree.remove(from) {
            Some(node @ Node::File { .. }) => {
                tree.insert(to.to_path_buf(), node);
                Ok(())
            }
            Some(Node::Dir) => {
                tree.insert(from.to_path_buf(), Node::Dir);
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("directory rename not supported: {}", from.display()),
                ))
            }
            None => Err(not_found(from)),
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.lock()?;
        match tree.get(path) {
            Some(Node::File { .. }) => {
                tree.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.lock()?;
        if !is_root(path) && !matches!(tree.get(path), Some(Node::Dir)) {
            return Err(not_found(path));
        }
        // BTreeMap keys are already ordered.
        Ok(tree
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}
