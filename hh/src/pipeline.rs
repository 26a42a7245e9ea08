//! Pipeline orchestrator and the watch-session loop
//!
//! Each accepted change event runs root → branch → report in its own task.
//! Failures stay inside that task; the session keeps watching.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::console;
use crate::git::{BranchResolver, find_git_root_within};
use crate::report::{ReportOutcome, ReportPayload, Reporter};
use crate::scheduler::Throttle;
use crate::watcher::{ChangeEvent, WatchStreams};

/// How one pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The changed path is not inside any repository
    NoRepository,
    /// The branch query failed
    BranchFailed,
    /// A report was attempted
    Reported(ReportOutcome),
}

/// Resolves and reports the branch for one change event
pub struct Pipeline {
    reporter: Arc<dyn Reporter>,
    branches: BranchResolver,
    token: String,
    host: String,
    ceiling: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(reporter: Arc<dyn Reporter>, branches: BranchResolver, token: impl Into<String>) -> Self {
        Self {
            reporter,
            branches,
            token: token.into(),
            host: String::new(),
            ceiling: None,
        }
    }

    /// Host named in connectivity guidance
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Stop the repository search at this directory
    pub fn with_ceiling(mut self, ceiling: impl Into<PathBuf>) -> Self {
        self.ceiling = Some(ceiling.into());
        self
    }

    pub async fn handle(&self, event: ChangeEvent) -> PipelineOutcome {
        debug!(?event, "Pipeline::handle: called");

        let Some(root) = find_git_root_within(&event.path, self.ceiling.as_deref()) else {
            debug!(path = ?event.path, "Pipeline::handle: not in a repository");
            return PipelineOutcome::NoRepository;
        };

        let branch = match self.branches.resolve(&root).await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(%root, error = %e, "Branch resolution failed");
                console::branch_failure(&root, &e);
                return PipelineOutcome::BranchFailed;
            }
        };

        let payload = ReportPayload::new(self.token.clone(), branch);
        let outcome = self.reporter.report(&payload).await;
        match &outcome {
            ReportOutcome::Delivered => info!(branch = %payload.branch, %root, "Report delivered"),
            other => warn!(branch = %payload.branch, %root, outcome = %other, "Report failed"),
        }
        console::outcome(&payload.branch, &outcome, &self.host);
        PipelineOutcome::Reported(outcome)
    }
}

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown signal fired
    Shutdown,
    /// The watcher's event channel closed; no further observation is possible
    SourceClosed,
}

/// Counters for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub received: u64,
    pub suppressed: u64,
    pub dispatched: u64,
    pub faults: u64,
    pub no_repository: u64,
    pub branch_failures: u64,
    pub delivered: u64,
    pub report_failures: u64,
}

impl SessionStats {
    fn record(&mut self, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::NoRepository => self.no_repository += 1,
            PipelineOutcome::BranchFailed => self.branch_failures += 1,
            PipelineOutcome::Reported(ReportOutcome::Delivered) => self.delivered += 1,
            PipelineOutcome::Reported(_) => self.report_failures += 1,
        }
    }
}

/// One watch session: the consumer side of the watcher's channels
pub struct Session {
    pipeline: Arc<Pipeline>,
    throttle: Throttle,
}

impl Session {
    pub fn new(pipeline: Pipeline, window: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            throttle: Throttle::new(window),
        }
    }

    /// Gate events and run the pipeline until shutdown or until the source closes
    ///
    /// Accepted events are spawned without waiting on earlier ones, so slow
    /// reports may overlap. On shutdown, in-flight work is abandoned; when the
    /// source closes, in-flight work is allowed to finish first unless shutdown
    /// fires while it drains.
    pub async fn run<S>(self, streams: WatchStreams, shutdown: S) -> (SessionEnd, SessionStats)
    where
        S: Future<Output = ()>,
    {
        let WatchStreams {
            mut events,
            mut faults,
        } = streams;
        let pipeline = self.pipeline;
        let gated = self.throttle.gate(move |event: ChangeEvent| {
            let pipeline = pipeline.clone();
            async move { pipeline.handle(event).await }
        });

        let mut in_flight: JoinSet<PipelineOutcome> = JoinSet::new();
        let mut stats = SessionStats::default();
        let mut faults_open = true;
        tokio::pin!(shutdown);

        info!(window = ?gated.throttle().window(), "Session started");

        let end = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!(in_flight = in_flight.len(), "Session::run: shutdown requested");
                    in_flight.abort_all();
                    break SessionEnd::Shutdown;
                }
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        warn!("Watcher event source closed");
                        drain(&mut in_flight, &mut stats, shutdown.as_mut()).await;
                        break SessionEnd::SourceClosed;
                    };
                    stats.received += 1;
                    match gated.call(event) {
                        Some(work) => {
                            stats.dispatched += 1;
                            in_flight.spawn(work);
                        }
                        None => {
                            stats.suppressed += 1;
                            debug!("Session::run: event coalesced");
                        }
                    }
                }
                maybe_fault = faults.recv(), if faults_open => {
                    match maybe_fault {
                        Some(fault) => {
                            stats.faults += 1;
                            warn!(%fault, "Watcher fault");
                            console::watcher_fault(&fault);
                        }
                        None => faults_open = false,
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok(outcome) => stats.record(&outcome),
                        Err(e) => warn!(error = %e, "Pipeline task failed"),
                    }
                }
            }
        };

        info!(?end, ?stats, "Session ended");
        (end, stats)
    }
}

/// Wait for in-flight work, abandoning it if shutdown fires first
async fn drain<S>(in_flight: &mut JoinSet<PipelineOutcome>, stats: &mut SessionStats, mut shutdown: Pin<&mut S>)
where
    S: Future<Output = ()>,
{
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!(in_flight = in_flight.len(), "drain: shutdown requested");
                in_flight.abort_all();
                return;
            }
            joined = in_flight.join_next() => match joined {
                Some(Ok(outcome)) => stats.record(&outcome),
                Some(Err(e)) => warn!(error = %e, "Pipeline task failed"),
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::watcher::ChangeKind;

    #[derive(Default)]
    struct RecordingReporter {
        branches: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn report(&self, payload: &ReportPayload) -> ReportOutcome {
            self.branches.lock().unwrap().push(payload.branch.to_string());
            ReportOutcome::Delivered
        }
    }

    fn streams() -> (mpsc::Sender<ChangeEvent>, mpsc::Sender<crate::watcher::WatcherFault>, WatchStreams) {
        let (event_tx, events) = mpsc::channel(16);
        let (fault_tx, faults) = mpsc::channel(16);
        (event_tx, fault_tx, WatchStreams { events, faults })
    }

    #[tokio::test]
    async fn test_outside_repository_is_silent_noop() {
        let temp = TempDir::new().unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let pipeline = Pipeline::new(
            reporter.clone(),
            BranchResolver::default().with_program("happyhour-must-not-run"),
            "tok",
        )
        .with_ceiling(temp.path());

        let outcome = pipeline
            .handle(ChangeEvent::new(ChangeKind::Changed, temp.path().join("a").join("b.ts")))
            .await;

        assert_eq!(outcome, PipelineOutcome::NoRepository);
        assert!(reporter.branches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_branch_failure_skips_report() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".git")).unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let pipeline = Pipeline::new(
            reporter.clone(),
            BranchResolver::default().with_program("happyhour-no-such-vcs"),
            "tok",
        );

        let outcome = pipeline
            .handle(ChangeEvent::new(ChangeKind::Changed, temp.path().join("a.ts")))
            .await;

        assert_eq!(outcome, PipelineOutcome::BranchFailed);
        assert!(reporter.branches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_shutdown_and_fault_handling() {
        let temp = TempDir::new().unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let pipeline = Pipeline::new(reporter, BranchResolver::default(), "tok").with_ceiling(temp.path());
        let session = Session::new(pipeline, Duration::from_secs(10));

        let (event_tx, fault_tx, streams) = streams();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(session.run(streams, async move {
            let _ = stop_rx.await;
        }));

        fault_tx
            .send(notify::Error::generic("inotify hiccup").into())
            .await
            .unwrap();
        event_tx
            .send(ChangeEvent::new(ChangeKind::Changed, temp.path().join("x.ts")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();

        let (end, stats) = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dispatched, 1);
    }
}
