use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "jankdb",
    about = "Inspect and edit a jankdb file store",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional subcommand; defaults to `show` when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load the store and print its value as JSON.
    Show,
    /// Replace the stored value with the given JSON document and save it.
    Put {
        /// JSON document, e.g. '{"theme":"dark"}'.
        json: String,
    },
    /// Round-trip a probe value through a scratch file next to the store.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
