//! happyhour - developer-activity reporting agent
//!
//! CLI entry point: `init` writes the project config, `watch` runs a session.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use happyhour::cli::{Cli, Command};
use happyhour::config::Config;
use happyhour::git::BranchResolver;
use happyhour::pipeline::{Pipeline, Session, SessionEnd};
use happyhour::report::create_reporter;
use happyhour::watcher::FileWatcher;
use happyhour::{console, init};

/// Determine log level with priority: CLI --log-level > config file > default (INFO)
fn parse_level(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> tracing::Level {
    match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("happyhour")
        .join("logs")
}

fn setup_logging(level: tracing::Level) -> Result<PathBuf> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_path = log_dir.join("happyhour.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(log_path)
}

/// Used when the log file cannot be created
fn setup_stderr_logging(level: tracing::Level) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    info!("Logging initialized on stderr (level: {:?})", level);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let level = parse_level(cli.log_level.as_deref(), config_log_level.as_deref());
    if let Err(e) = setup_logging(level) {
        eprintln!("Warning: {:#}; logging to stderr", e);
        setup_stderr_logging(level);
    }

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Init => {
            debug!("main: matched Init command");
            init::run_init(cli.config.as_ref())
        }
        Command::Watch => {
            debug!("main: matched Watch command");
            cmd_watch(&cli).await
        }
    }
}

/// Host part of the endpoint, for connectivity guidance
fn endpoint_host(endpoint: &str) -> String {
    reqwest::Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| endpoint.to_string())
}

/// Resolves when Ctrl-C arrives; never resolves if the handler cannot be installed
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

async fn cmd_watch(cli: &Cli) -> Result<()> {
    debug!(debug_mode = cli.debug, url = ?cli.url, "cmd_watch: called");

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Configuration is incomplete")?;

    let endpoint = config.endpoint(cli.url.as_deref());
    let reporter =
        create_reporter(cli.debug, &endpoint, config.request_timeout()).context("Failed to set up reporting")?;
    let pipeline = Pipeline::new(
        reporter,
        BranchResolver::new(config.git_timeout()),
        config.project_token.clone(),
    )
    .with_host(endpoint_host(&endpoint));

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let settings = config.watch_settings();
    let (watcher, streams) = FileWatcher::start(&settings, &cwd).context("Failed to start watching")?;
    info!(backend = ?watcher.backend(), bases = ?watcher.bases(), "Watching");

    let target = if cli.debug {
        "debug log (no network)".to_string()
    } else {
        endpoint.clone()
    };
    console::session_started(&settings.patterns, &target);

    let session = Session::new(pipeline, config.coalesce_window());
    let (end, stats) = session.run(streams, ctrl_c()).await;
    drop(watcher);

    info!(?end, ?stats, "cmd_watch: session finished");
    match end {
        SessionEnd::Shutdown => {
            console::note(&format!(
                "Stopped: {} events, {} reports delivered",
                stats.received, stats.delivered
            ));
            Ok(())
        }
        SessionEnd::SourceClosed => Err(eyre!("File watcher stopped unexpectedly")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_priority() {
        assert_eq!(parse_level(Some("debug"), Some("ERROR")), tracing::Level::DEBUG);
        assert_eq!(parse_level(None, Some("warning")), tracing::Level::WARN);
        assert_eq!(parse_level(None, None), tracing::Level::INFO);
        assert_eq!(parse_level(Some("loud"), None), tracing::Level::INFO);
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("https://happyhour.platejoy.com"), "happyhour.platejoy.com");
        assert_eq!(endpoint_host("http://localhost:3000/"), "localhost");
        assert_eq!(endpoint_host("not a url"), "not a url");
    }
}
