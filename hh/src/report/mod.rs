//! Reporting client
//!
//! Delivers one branch report per coalesced window and classifies what
//! happened. Reporters never return errors: every failure becomes a
//! [`ReportOutcome`] that the pipeline logs and moves past.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

mod debug;
mod http;
mod outcome;

pub use debug::DebugReporter;
pub use http::{ClientError, DEFAULT_REQUEST_TIMEOUT, HttpReporter};
pub use outcome::{ReportOutcome, ReportPayload, mask_token};

/// Default collection endpoint
pub const DEFAULT_ENDPOINT: &str = "https://happyhour.platejoy.com";

/// Sends a branch report somewhere
///
/// Implementations must be safe to call concurrently: windows that overlap
/// with a slow request produce overlapping calls.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, payload: &ReportPayload) -> ReportOutcome;
}

/// Pick the reporter for a session: local logging in debug mode, HTTPS otherwise
pub fn create_reporter(debug_mode: bool, endpoint: &str, timeout: Duration) -> Result<Arc<dyn Reporter>, ClientError> {
    debug!(debug_mode, %endpoint, "create_reporter: called");
    if debug_mode {
        Ok(Arc::new(DebugReporter::new()))
    } else {
        Ok(Arc::new(HttpReporter::new(endpoint, timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_reporter_debug_skips_url_validation() {
        assert!(create_reporter(true, "not a url", DEFAULT_REQUEST_TIMEOUT).is_ok());
    }

    #[test]
    fn test_create_reporter_validates_url() {
        assert!(create_reporter(false, "not a url", DEFAULT_REQUEST_TIMEOUT).is_err());
        assert!(create_reporter(false, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT).is_ok());
    }
}
