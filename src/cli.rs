//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "parlo",
    version,
    about = "Hands-free voice conversation with a chat model"
)]
pub struct Cli {
    /// Path to a config file (default: $XDG_CONFIG_HOME/parlo/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the conversation loop (default)
    Run,
    /// List available audio input devices
    Devices,
    /// Print the effective configuration
    Config,
}
