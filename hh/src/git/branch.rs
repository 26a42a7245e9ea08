//! Current-branch lookup via `git rev-parse`

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::root::GitRoot;

/// Default upper bound on a single branch query
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the currently checked-out branch, trimmed
///
/// A detached HEAD comes back as the literal `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch(String);

impl Branch {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize raw query output; `None` if nothing is left after trimming
    pub fn from_output(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from resolving a branch
#[derive(Debug, Error)]
pub enum BranchError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("branch query exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("branch query reported: {0}")]
    Stderr(String),

    #[error("branch query produced no output")]
    Empty,

    #[error("branch query timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs the read-only branch query against a repository
#[derive(Debug, Clone)]
pub struct BranchResolver {
    program: String,
    timeout: Duration,
}

impl Default for BranchResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GIT_TIMEOUT)
    }
}

impl BranchResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Use a different executable in place of `git`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the current branch of `root`
    ///
    /// Runs `git -C <root> rev-parse --abbrev-ref HEAD` with prompting disabled.
    /// A non-zero exit, any stderr output, empty stdout or a timeout is an error.
    pub async fn resolve(&self, root: &GitRoot) -> Result<Branch, BranchError> {
        debug!(%root, program = %self.program, "BranchResolver::resolve: called");

        let mut cmd = Command::new(&self.program);
        cmd.arg("-C")
            .arg(root.path())
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(error = %e, "BranchResolver::resolve: spawn failed");
                return Err(BranchError::Spawn {
                    program: self.program.clone(),
                    source: e,
                });
            }
            Err(_) => {
                debug!("BranchResolver::resolve: timed out");
                return Err(BranchError::Timeout(self.timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            debug!(status = ?output.status, "BranchResolver::resolve: non-zero exit");
            return Err(BranchError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            debug!(%stderr, "BranchResolver::resolve: diagnostic output on stderr");
            return Err(BranchError::Stderr(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let branch = Branch::from_output(&stdout).ok_or(BranchError::Empty)?;
        debug!(%branch, "BranchResolver::resolve: resolved");
        Ok(branch)
    }
}
