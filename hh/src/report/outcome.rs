//! Report payload and outcome types

use std::fmt;

use crate::git::Branch;

/// What gets reported for one coalesced window
#[derive(Clone)]
pub struct ReportPayload {
    pub token: String,
    pub branch: Branch,
}

impl ReportPayload {
    pub fn new(token: impl Into<String>, branch: Branch) -> Self {
        Self {
            token: token.into(),
            branch,
        }
    }
}

impl fmt::Debug for ReportPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportPayload")
            .field("token", &mask_token(&self.token))
            .field("branch", &self.branch)
            .finish()
    }
}

/// Classified result of a single report attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Endpoint answered with a 2xx status
    Delivered,

    /// Endpoint rejected the project token (401)
    Unauthorized,

    /// No response: refused, DNS failure, timeout, or the request could not be built
    Unreachable { detail: String },

    /// Any other non-2xx status
    ServerError { status: u16 },
}

impl ReportOutcome {
    /// Classify a received HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => ReportOutcome::Delivered,
            401 => ReportOutcome::Unauthorized,
            _ => ReportOutcome::ServerError { status },
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered)
    }
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportOutcome::Delivered => write!(f, "delivered"),
            ReportOutcome::Unauthorized => write!(f, "unauthorized"),
            ReportOutcome::Unreachable { detail } => write!(f, "unreachable: {}", detail),
            ReportOutcome::ServerError { status } => write!(f, "server error {}", status),
        }
    }
}

/// Identifying but non-secret form of a token: first four chars, rest starred
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}
