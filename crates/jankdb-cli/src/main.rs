mod cli;
mod config;
mod storage;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use jankdb_core::OsFileSystem;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    match cli.command.unwrap_or(Command::Show) {
        Command::Show => show(&storage::store_from_config(&config)?)?,
        Command::Put { json } => put(&json, &storage::store_from_config(&config)?)?,
        Command::Health => run_health_check(&config)?,
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(cli.config.as_deref(), &config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("jankdb {}", env!("CARGO_PKG_VERSION"));
}

fn show(store: &storage::JsonStore) -> Result<()> {
    store.load()?;
    println!("{}", serde_json::to_string_pretty(&store.get())?);
    Ok(())
}

fn put(json: &str, store: &storage::JsonStore) -> Result<()> {
    let value: Value = serde_json::from_str(json).wrap_err("argument is not valid JSON")?;
    store.set(value);
    store.save()?;
    info!(path = %store.path().display(), encrypted = store.is_encrypted(), "saved");
    Ok(())
}

/// Runs a quick health check of the configured storage path.
fn run_health_check(config: &config::Config) -> Result<()> {
    let root = storage::base_dir(config)?;
    let env_key = std::env::var(storage::ENCRYPTION_KEY_ENV).ok();
    let options = storage::resolve_options(config, env_key);
    storage::run_store_health(OsFileSystem, &root, &options)?;
    println!("Storage: ok");
    Ok(())
}

fn init_config(path: Option<&std::path::Path>, config: &config::Config) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_path()?,
    };
    let written = config::write_default_if_missing(config, &path)?;
    println!("Config initialized at {}", written.display());
    Ok(())
}
