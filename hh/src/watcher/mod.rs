//! File watcher adapter
//!
//! Subscribes to the directories behind each watch pattern, skipping excluded
//! trees, and forwards filtered change events over a channel. Watcher-level
//! errors travel on a separate channel so they can be reported without ending
//! the session.
//!
//! ```text
//! notify thread ──► EventFilter ──► events: mpsc<ChangeEvent>  ──► session
//!                               └─► faults: mpsc<WatcherFault> ──► session
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

mod filter;
mod pattern;

pub use filter::{DEFAULT_IGNORE, EventFilter, classify};
pub use pattern::{PatternError, WatchPattern};

/// Default event queue depth between the notify thread and the session
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
    Other,
}

/// A single file-system change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A watcher-level error, such as running out of inotify watches
#[derive(Debug, Clone)]
pub struct WatcherFault {
    pub message: String,
    pub paths: Vec<PathBuf>,
    pub limit_reached: bool,
}

impl From<notify::Error> for WatcherFault {
    fn from(err: notify::Error) -> Self {
        let limit_reached = matches!(err.kind, notify::ErrorKind::MaxFilesWatch);
        Self {
            message: err.to_string(),
            paths: err.paths,
            limit_reached,
        }
    }
}

impl fmt::Display for WatcherFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.paths.is_empty() {
            let paths: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
            write!(f, " ({})", paths.join(", "))?;
        }
        if self.limit_reached {
            write!(f, "; raise the OS file-watch limit (fs.inotify.max_user_watches on Linux)")?;
        }
        Ok(())
    }
}

/// Errors starting a watch session
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no watch patterns configured")]
    NoPatterns,

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("none of the watch patterns point at an existing directory")]
    NothingToWatch,

    #[error("failed to resolve watch root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start file watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to start directory tracker: {0}")]
    Tracker(#[source] std::io::Error),
}

/// Watch-session settings
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub patterns: Vec<String>,
    pub ignore: Vec<String>,
    pub settle: Duration,
    pub poll: bool,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            settle: Duration::from_millis(500),
            poll: false,
            poll_interval: Duration::from_secs(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Which notify backend is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Native,
    Poll,
}

/// Receiving ends of a watch session
pub struct WatchStreams {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub faults: mpsc::Receiver<WatcherFault>,
}

type SharedWatcher = Arc<Mutex<Box<dyn Watcher + Send>>>;

/// A running subscription; dropping it stops the watch
///
/// Every non-excluded directory under each base gets its own non-recursive
/// watch, so excluded trees such as `node_modules` never consume watch
/// descriptors. Directories created later are picked up by a tracker thread.
pub struct FileWatcher {
    _watcher: SharedWatcher,
    backend: Backend,
    bases: Vec<PathBuf>,
    watched: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl FileWatcher {
    /// Subscribe to every pattern's base directory under `root`
    pub fn start(settings: &WatchSettings, root: &Path) -> Result<(Self, WatchStreams), WatchError> {
        debug!(?settings, ?root, "FileWatcher::start: called");
        if settings.patterns.is_empty() {
            return Err(WatchError::NoPatterns);
        }

        let root = root.canonicalize().map_err(|source| WatchError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let patterns = settings
            .patterns
            .iter()
            .map(|p| WatchPattern::parse(p, &root))
            .collect::<Result<Vec<_>, _>>()?;

        let bases = watch_bases(&patterns);
        if bases.is_empty() {
            return Err(WatchError::NothingToWatch);
        }

        let filter = Arc::new(EventFilter::new(
            root.clone(),
            patterns,
            &settings.ignore,
            settings.settle,
        ));
        let dirs = watch_dirs(&bases, &filter);
        debug!(count = dirs.len(), "FileWatcher::start: directories to watch");

        let (event_tx, event_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (fault_tx, fault_rx) = mpsc::channel(64);
        let (dir_tx, dir_rx) = std_mpsc::channel();

        let make_handler = || event_handler(filter.clone(), event_tx.clone(), fault_tx.clone(), dir_tx.clone());

        let (watcher, backend): (Box<dyn Watcher + Send>, Backend) = if settings.poll {
            (Box::new(subscribe_poll(make_handler(), &dirs, settings.poll_interval)?), Backend::Poll)
        } else {
            match subscribe_native(make_handler(), &dirs) {
                Ok(w) => (Box::new(w), Backend::Native),
                Err(e) => {
                    warn!(error = %e, "Native file notification unavailable, falling back to polling");
                    (Box::new(subscribe_poll(make_handler(), &dirs, settings.poll_interval)?), Backend::Poll)
                }
            }
        };

        let watcher: SharedWatcher = Arc::new(Mutex::new(watcher));
        let watched = Arc::new(Mutex::new(dirs.into_iter().collect::<BTreeSet<_>>()));
        {
            let watcher = Arc::downgrade(&watcher);
            let watched = watched.clone();
            let filter = filter.clone();
            thread::Builder::new()
                .name("happyhour-dirs".to_string())
                .spawn(move || track_directories(watcher, watched, filter, dir_rx))
                .map_err(WatchError::Tracker)?;
        }

        filter.arm();
        info!(?backend, ?bases, "File watcher started");

        Ok((
            Self {
                _watcher: watcher,
                backend,
                bases,
                watched,
            },
            WatchStreams {
                events: event_rx,
                faults: fault_rx,
            },
        ))
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Directories currently holding a watch, sorted
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        lock(&self.watched).iter().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Existing base directories with nested ones collapsed into their parents
fn watch_bases(patterns: &[WatchPattern]) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        match pattern.base().canonicalize() {
            Ok(base) if base.is_dir() => candidates.push(base),
            Ok(base) => warn!(pattern = pattern.as_str(), ?base, "Watch base is not a directory, skipping"),
            Err(e) => warn!(pattern = pattern.as_str(), error = %e, "Watch base does not exist, skipping"),
        }
    }

    candidates.sort();
    candidates.dedup();

    let mut bases: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if !bases.iter().any(|kept| candidate.starts_with(kept)) {
            bases.push(candidate);
        }
    }
    bases
}

/// Every directory below each base, pruning excluded subtrees
fn watch_dirs(bases: &[PathBuf], filter: &EventFilter) -> Vec<PathBuf> {
    bases.iter().flat_map(|base| walk_dirs(base, filter)).collect()
}

/// `dir` itself plus its non-excluded subdirectories
fn walk_dirs(dir: &Path, filter: &EventFilter) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (e.file_type().is_dir() && !filter.is_ignored(e.path())))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!(error = %err, "walk_dirs: skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

/// Watch bookkeeping requested from the notify callback
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirChange {
    Added(PathBuf),
    Removed(PathBuf),
}

/// Directory additions and removals carried by one notify event
fn directory_changes(event: &notify::Event, filter: &EventFilter) -> Vec<DirChange> {
    let created = matches!(event.kind, EventKind::Create(_));
    let structural = created || matches!(event.kind, EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)));
    if !structural {
        return Vec::new();
    }

    let mut changes = Vec::new();
    for path in &event.paths {
        if path.is_dir() {
            if !filter.is_ignored(path) {
                changes.push(DirChange::Added(path.clone()));
            }
        } else if !created {
            changes.push(DirChange::Removed(path.clone()));
        }
    }
    changes
}

/// Add watches for new directories until the watcher is dropped
///
/// Runs on its own thread: registering a watch from inside the notify
/// callback would block the backend's event loop on itself.
fn track_directories(
    watcher: Weak<Mutex<Box<dyn Watcher + Send>>>,
    watched: Arc<Mutex<BTreeSet<PathBuf>>>,
    filter: Arc<EventFilter>,
    changes: std_mpsc::Receiver<DirChange>,
) {
    while let Ok(change) = changes.recv() {
        let Some(watcher) = watcher.upgrade() else {
            break;
        };
        match change {
            DirChange::Added(dir) => {
                let mut watcher = lock(&watcher);
                let mut watched = lock(&watched);
                for sub in walk_dirs(&dir, &filter) {
                    if watched.contains(&sub) {
                        continue;
                    }
                    match watcher.watch(&sub, RecursiveMode::NonRecursive) {
                        Ok(()) => {
                            debug!(dir = ?sub, "track_directories: watching new directory");
                            watched.insert(sub);
                        }
                        Err(e) => warn!(dir = ?sub, error = %e, "Failed to watch new directory"),
                    }
                }
            }
            DirChange::Removed(dir) => {
                lock(&watched).retain(|p| !p.starts_with(&dir));
            }
        }
    }
    debug!("track_directories: stopped");
}

fn event_handler(
    filter: Arc<EventFilter>,
    events: mpsc::Sender<ChangeEvent>,
    faults: mpsc::Sender<WatcherFault>,
    dirs: std_mpsc::Sender<DirChange>,
) -> impl FnMut(notify::Result<notify::Event>) + Send + 'static {
    move |res| match res {
        Ok(event) => {
            for change in directory_changes(&event, &filter) {
                if dirs.send(change).is_err() {
                    debug!("event_handler: directory tracker gone");
                }
            }
            for change in filter.translate(&event) {
                match events.try_send(change) {
                    Ok(()) => {}
                    Err(TrySendError::Full(change)) => {
                        debug!(path = ?change.path, "event_handler: queue full, dropping event");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("event_handler: session gone");
                        return;
                    }
                }
            }
        }
        Err(err) => {
            let fault = WatcherFault::from(err);
            if faults.try_send(fault).is_err() {
                debug!("event_handler: fault channel unavailable");
            }
        }
    }
}

fn subscribe_native<H>(handler: H, dirs: &[PathBuf]) -> notify::Result<RecommendedWatcher>
where
    H: notify::EventHandler,
{
    let mut watcher = RecommendedWatcher::new(handler, notify::Config::default())?;
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    Ok(watcher)
}

fn subscribe_poll<H>(handler: H, dirs: &[PathBuf], interval: Duration) -> notify::Result<PollWatcher>
where
    H: notify::EventHandler,
{
    let mut watcher = PollWatcher::new(handler, notify::Config::default().with_poll_interval(interval))?;
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    Ok(watcher)
}
