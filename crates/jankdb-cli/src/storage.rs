use std::path::{Path, PathBuf};

use crate::config::{Config, DEFAULT_FILE_NAME};
use color_eyre::Result;
use dirs::data_dir;
use jankdb_core::{FileSystem, OsFileSystem};
use jankdb_storage::{atomic, Store, StoreOptions};
use serde_json::{json, Value};
use tracing::debug;

/// Overrides `store.encryption_key` from the config file when set.
pub const ENCRYPTION_KEY_ENV: &str = "JANKDB_ENCRYPTION_KEY";

const HEALTH_FILE_NAME: &str = ".jankdb-health.json";

/// The CLI stores arbitrary JSON documents.
pub type JsonStore<F = OsFileSystem> = Store<Value, F>;

/// Resolve the default data directory for jankdb.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("jankdb"))
}

/// Base directory from config, falling back to the platform data dir.
pub fn base_dir(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(root) => Ok(root.clone()),
        None => default_data_dir(),
    }
}

/// Store options from config with the environment key override applied.
pub fn resolve_options(config: &Config, env_key: Option<String>) -> StoreOptions {
    let mut options = config.store.clone();
    if options.file_name.is_empty() {
        options.file_name = DEFAULT_FILE_NAME.to_string();
    }
    if let Some(key) = env_key.filter(|k| !k.is_empty()) {
        options.encryption_key = key;
    }
    options
}

/// Build the store described by `config` on the real filesystem, honoring
/// [`ENCRYPTION_KEY_ENV`].
pub fn store_from_config(config: &Config) -> Result<JsonStore> {
    open_store(config, std::env::var(ENCRYPTION_KEY_ENV).ok())
}

/// Build the store described by `config` with an explicit key override.
pub fn open_store(config: &Config, env_key: Option<String>) -> Result<JsonStore> {
    let root = base_dir(config)?;
    let options = resolve_options(config, env_key);
    debug!(?root, ?options, "initializing store");
    Ok(Store::new(OsFileSystem, root, options)?)
}

/// Save and reload a probe document with the same layout and encryption as the
/// configured store, then remove the scratch file.
pub fn run_store_health<F: FileSystem + Clone>(
    fs: F,
    root: &Path,
    options: &StoreOptions,
) -> Result<()> {
    let probe_options = StoreOptions {
        file_name: HEALTH_FILE_NAME.to_string(),
        enable_backup: false,
        use_cache: false,
        ..options.clone()
    };
    let probe = json!({ "probe": "ok" });

    let writer: JsonStore<F> = Store::new(fs.clone(), root, probe_options.clone())?;
    writer.set(probe.clone());
    writer.save()?;

    let reader: JsonStore<F> = Store::new(fs.clone(), root, probe_options)?;
    reader.load()?;
    let round_trip = reader.get();

    fs.remove_file(reader.path())?;
    // An earlier crashed probe may have left its temp file behind.
    let tmp = atomic::with_suffix(reader.path(), atomic::TMP_SUFFIX);
    if fs.metadata(&tmp).is_ok() {
        fs.remove_file(&tmp)?;
    }

    if round_trip != probe {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

/// Helper for tests to construct a store rooted at a temp dir.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>, options: StoreOptions) -> JsonStore {
    Store::new(OsFileSystem, root, options).expect("test store")
}
