use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use jankdb_storage::StoreOptions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILE_NAME: &str = "store.json";

// The file may carry `store.encryption_key`.
#[cfg(unix)]
const CONFIG_FILE_MODE: u32 = 0o600;

/// User-level configuration loaded from `~/.config/jankdb/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Override for the base directory the store lives under.
    pub data_dir: Option<PathBuf>,
    /// Store layout, backup, cache and encryption settings.
    pub store: StoreOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            store: StoreOptions {
                file_name: DEFAULT_FILE_NAME.to_string(),
                ..StoreOptions::default()
            },
        }
    }
}

/// Load config from `path`, or the default location when `None`.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("jankdb").join("config.toml"))
}

/// Write `config` to `path`, creating parent directories as needed.
/// An existing file is left alone so user edits are never clobbered.
pub fn write_default_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    let mut open = OpenOptions::new();
    open.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open.mode(CONFIG_FILE_MODE);
    }
    let mut file = open.open(path)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    Ok(path.to_path_buf())
}
