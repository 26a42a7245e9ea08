//! CLI argument parsing for happyhour

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "happyhour")]
#[command(
    version,
    about = "Reports the branch you are working on while you edit files",
    after_help = "First: happyhour init\nThen: happyhour watch"
)]
pub struct Cli {
    /// Path to config file (default: ./.happyhour)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the reporting endpoint (e.g. for testing)
    #[arg(short, long, global = true)]
    pub url: Option<String>,

    /// Log reports locally instead of sending them
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Set the project token and watch patterns
    Init,

    /// Watch files and report the active branch
    #[command(alias = "track")]
    Watch,
}
