//! happyhour - developer-activity reporting agent
//!
//! Watches a project tree and works out which Git repository and branch each
//! changed file belongs to. It then reports that branch to a collection
//! endpoint, at most once per coalescing window.
//!
//! # Pipeline
//!
//! ```text
//! watcher ──► scheduler (leading-edge throttle) ──► pipeline
//!                                                     ├─ git root lookup
//!                                                     ├─ git rev-parse --abbrev-ref HEAD
//!                                                     └─ reporter (HTTPS or debug log)
//! ```
//!
//! # Modules
//!
//! - [`watcher`] - notify-based file watcher with glob and ignore filtering
//! - [`scheduler`] - coalescing throttle
//! - [`git`] - repository root and branch resolution
//! - [`report`] - reporting clients and outcome classification
//! - [`pipeline`] - per-event orchestration and the session loop
//! - [`config`] - `.happyhour` configuration
//! - [`init`] - first-run setup
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod console;
pub mod git;
pub mod init;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod watcher;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use git::{Branch, BranchError, BranchResolver, GitRoot, find_git_root};
pub use pipeline::{Pipeline, PipelineOutcome, Session, SessionEnd, SessionStats};
pub use report::{DebugReporter, HttpReporter, ReportOutcome, ReportPayload, Reporter, create_reporter};
pub use scheduler::{Gated, Throttle};
pub use watcher::{ChangeEvent, ChangeKind, FileWatcher, WatchSettings, WatchStreams, WatcherFault};
