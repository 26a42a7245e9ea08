//! happyhour configuration types and loading
//!
//! The config lives in a `.happyhour` YAML file in the project directory and
//! is read once at the start of a watch session.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::report::DEFAULT_ENDPOINT;
use crate::watcher::{DEFAULT_IGNORE, DEFAULT_QUEUE_CAPACITY, WatchSettings};

/// Config file name, looked up in the current directory
pub const CONFIG_FILE: &str = ".happyhour";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration found at {0}; run `happyhour init` first")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("project_token is not set; run `happyhour init`")]
    MissingToken,

    #[error("no watch patterns or extensions configured; run `happyhour init`")]
    MissingPatterns,
}

/// Main happyhour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project token issued by the collection service
    pub project_token: String,

    /// Whitespace-separated glob patterns, e.g. `**/*.rb app/javascript/**/*.js`
    pub patterns: String,

    /// File extensions to watch anywhere in the tree, e.g. `[rb, js]`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    /// Reporting endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Directory names never watched; replaces the built-in list when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,

    /// Minimum seconds between two reports
    pub coalesce_secs: u64,

    /// Quiet period after subscribing before events are forwarded
    pub settle_ms: u64,

    /// Force the polling backend
    pub poll: bool,

    pub poll_interval_ms: u64,

    /// Upper bound on one branch query
    pub git_timeout_ms: u64,

    /// Upper bound on one report request
    pub request_timeout_ms: u64,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_token: String::new(),
            patterns: String::new(),
            extensions: Vec::new(),
            url: None,
            ignore: None,
            coalesce_secs: 10,
            settle_ms: 500,
            poll: false,
            poll_interval_ms: 1000,
            git_timeout_ms: 5000,
            request_timeout_ms: 10_000,
            log_level: None,
        }
    }
}

impl Config {
    /// Path of the config file: explicit, or `.happyhour` in the current directory
    pub fn path(config_path: Option<&PathBuf>) -> PathBuf {
        config_path.cloned().unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Load configuration; a missing file is an error
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        let path = Self::path(config_path);
        debug!(?path, "Config::load: called");
        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }
        Self::load_from_file(&path)
    }

    /// Load the log level early, before logging is set up; errors are ignored
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let content = fs::read_to_string(Self::path(config_path)).ok()?;
        let config: Config = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Check that a watch session can start with this config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.watch_patterns().is_empty() {
            return Err(ConfigError::MissingPatterns);
        }
        Ok(())
    }

    /// Glob patterns from `patterns` plus one `**/*.<ext>` per extension
    pub fn watch_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.patterns.split_whitespace().map(str::to_string).collect();
        for ext in &self.extensions {
            let ext = ext.trim().trim_start_matches("*.").trim_start_matches('.');
            if ext.is_empty() {
                continue;
            }
            let pattern = format!("**/*.{}", ext);
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        patterns
    }

    pub fn ignore_list(&self) -> Vec<String> {
        match &self.ignore {
            Some(list) => list.clone(),
            None => DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            patterns: self.watch_patterns(),
            ignore: self.ignore_list(),
            settle: Duration::from_millis(self.settle_ms),
            poll: self.poll,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Endpoint with precedence: command line, then config, then built-in default
    pub fn endpoint(&self, cli_url: Option<&str>) -> String {
        cli_url
            .or(self.url.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT)
            .to_string()
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_secs(self.coalesce_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
