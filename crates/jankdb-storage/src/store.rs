use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use jankdb_core::{FileSystem, OsFileSystem};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    atomic::atomic_write_file,
    cache::Cache,
    crypto::{decrypt_data, encrypt_data},
    error::StoreError,
};

/// Key the whole value is shadowed under in the cache.
pub const CACHE_KEY: &str = "all";

const DIR_MODE: u32 = 0o755;

/// Construction-time options for a [`Store`].
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Optional subdirectory under the base path (empty = none).
    pub sub_dir: String,
    pub file_name: String,
    /// Keep the previous file as `<file>.bak` on every save.
    pub enable_backup: bool,
    pub use_cache: bool,
    /// Cache entry lifetime; `None` never expires.
    #[serde(with = "duration_secs", skip_serializing_if = "Option::is_none")]
    pub default_expiration: Option<Duration>,
    /// Cache sweep interval; `None` disables the background sweeper.
    #[serde(with = "duration_secs", skip_serializing_if = "Option::is_none")]
    pub cleanup_interval: Option<Duration>,
    /// Non-empty enables encryption at rest with this passphrase.
    pub encryption_key: String,
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("sub_dir", &self.sub_dir)
            .field("file_name", &self.file_name)
            .field("enable_backup", &self.enable_backup)
            .field("use_cache", &self.use_cache)
            .field("default_expiration", &self.default_expiration)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("encrypted", &!self.encryption_key.is_empty())
            .finish()
    }
}

/// Durations are written as whole seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => ser.serialize_some(&duration.as_secs()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_secs))
    }
}

/// File-backed holder for a single value of type `T`.
///
/// `load` and `set` take the write lock; `get` and `save` take the read lock.
/// Saves from one instance share the `.tmp` path, so they run the write
/// protocol one at a time. Across processes nothing is coordinated: the final
/// rename is what keeps readers from ever observing a partial file.
pub struct Store<T, F = OsFileSystem> {
    fs: F,
    path: PathBuf,
    enable_backup: bool,
    encryption_key: String,
    data: RwLock<T>,
    cache: Option<Cache<T>>,
    write_lock: Mutex<()>,
}

impl<T, F> Store<T, F>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
    F: FileSystem,
{
    /// Build a store for `<base_path>/<sub_dir>/<file_name>`. Nothing is read
    /// until [`Store::load`].
    pub fn new(
        fs: F,
        base_path: impl Into<PathBuf>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        if options.file_name.is_empty() {
            return Err(StoreError::InvalidOptions {
                reason: "file_name must not be empty".to_string(),
            });
        }

        let mut path = base_path.into();
        if !options.sub_dir.is_empty() {
            path.push(&options.sub_dir);
        }
        path.push(&options.file_name);

        let cache = options
            .use_cache
            .then(|| Cache::new(options.default_expiration, options.cleanup_interval));

        debug!(
            path = %path.display(),
            encrypted = !options.encryption_key.is_empty(),
            backup = options.enable_backup,
            cached = options.use_cache,
            "opened store"
        );

        Ok(Self {
            fs,
            path,
            enable_backup: options.enable_backup,
            encryption_key: options.encryption_key,
            data: RwLock::new(T::default()),
            cache,
            write_lock: Mutex::new(()),
        })
    }

    /// Read the value from disk, replacing the in-memory one.
    ///
    /// A missing file is not an error: the current value is kept. On any
    /// failure the in-memory value is left unchanged.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<(), StoreError> {
        let mut data = self.write_data();

        match self.fs.metadata(&self.path) {
            Ok(_) => {}
            Err(err) if self.fs.is_not_found(&err) => {
                debug!("no file on disk, keeping current value");
                return Ok(());
            }
            Err(source) => {
                return Err(StoreError::Stat {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        let bytes = self
            .fs
            .read_file(&self.path)
            .map_err(|e| StoreError::io("read", &self.path, e))?;

        let value: T = if self.encryption_key.is_empty() {
            self.deserialize(&bytes)?
        } else {
            let plaintext = decrypt_data(&self.encryption_key, &String::from_utf8_lossy(&bytes))
                .map_err(|source| StoreError::Decryption {
                    path: self.path.clone(),
                    source,
                })?;
            self.deserialize(&plaintext)?
        };

        if let Some(cache) = &self.cache {
            cache.set(CACHE_KEY, value.clone());
        }
        *data = value;
        debug!(bytes = bytes.len(), "loaded");
        Ok(())
    }

    /// Write the in-memory value to disk via the atomic write protocol,
    /// creating parent directories as needed.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<(), StoreError> {
        let data = self.read_data();

        let json =
            serde_json::to_vec_pretty(&*data).map_err(|source| StoreError::Serialization {
                path: self.path.clone(),
                source,
            })?;

        let payload = if self.encryption_key.is_empty() {
            json
        } else {
            encrypt_data(&self.encryption_key, &json)
                .map_err(|source| StoreError::Encryption {
                    path: self.path.clone(),
                    source,
                })?
                .into_bytes()
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(dir, DIR_MODE)
                .map_err(|e| StoreError::io("create directory", dir, e))?;
        }

        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        atomic_write_file(&self.fs, &self.path, &payload, self.enable_backup)
    }

    /// Snapshot of the in-memory value.
    pub fn get(&self) -> T {
        self.read_data().clone()
    }

    /// Replace the in-memory value. Nothing is written until [`Store::save`].
    pub fn set(&self, value: T) {
        let mut data = self.write_data();
        if let Some(cache) = &self.cache {
            cache.set(CACHE_KEY, value.clone());
        }
        *data = value;
    }

    /// Mutate the in-memory value in place under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut data = self.write_data();
        let out = f(&mut *data);
        if let Some(cache) = &self.cache {
            cache.set(CACHE_KEY, data.clone());
        }
        out
    }

    /// The cached shadow of the value, if caching is on and the entry is live.
    pub fn cached(&self) -> Option<T> {
        self.cache.as_ref().and_then(|cache| cache.get(CACHE_KEY))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        !self.encryption_key.is_empty()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Deserialization {
            path: self.path.clone(),
            source,
        })
    }

    // A panic inside `update` can leave a half-edited value behind, but it is
    // still a valid `T`, so poisoned locks are recovered rather than surfaced.
    fn read_data(&self) -> RwLockReadGuard<'_, T> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}
