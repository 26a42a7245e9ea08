//! Local-only reporter used with `--debug`

use async_trait::async_trait;
use tracing::info;

use super::{ReportOutcome, ReportPayload, Reporter, mask_token};
use crate::console;

/// Logs what would have been sent instead of sending it
#[derive(Debug, Default, Clone)]
pub struct DebugReporter;

impl DebugReporter {
    pub fn new() -> Self {
        Self
    }

    /// The line describing a report that was not sent
    pub fn describe(payload: &ReportPayload) -> String {
        format!(
            "[debug] would report branch '{}' with token {}",
            payload.branch,
            mask_token(&payload.token)
        )
    }
}

#[async_trait]
impl Reporter for DebugReporter {
    async fn report(&self, payload: &ReportPayload) -> ReportOutcome {
        let line = Self::describe(payload);
        info!(branch = %payload.branch, "{}", line);
        console::note(&line);
        ReportOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Branch;

    #[test]
    fn test_describe_contains_branch_and_masks_token() {
        let payload = ReportPayload::new("abcd-secret", Branch::from_output("release/1.2\n").unwrap());
        let line = DebugReporter::describe(&payload);
        assert!(line.contains("release/1.2"));
        assert!(line.contains("abcd****"));
        assert!(!line.contains("secret"));
    }

    #[tokio::test]
    async fn test_debug_report_is_delivered_locally() {
        let payload = ReportPayload::new("abcd-secret", Branch::from_output("main").unwrap());
        let outcome = DebugReporter::new().report(&payload).await;
        assert_eq!(outcome, ReportOutcome::Delivered);
    }
}
