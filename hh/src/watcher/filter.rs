//! Turns raw notify events into the change events the session cares about

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use tracing::{debug, trace};

use super::pattern::WatchPattern;
use super::{ChangeEvent, ChangeKind};

/// Directories never watched unless the ignore list is overridden
///
/// Version-control internals would feed our own `git` queries back into the
/// watcher; dependency directories churn on every install.
pub const DEFAULT_IGNORE: &[&str] = &[".git", ".hg", ".svn", "node_modules", "bower_components", ".bundle", ".venv"];

/// Exclusion, pattern and settle-period filtering
#[derive(Debug)]
pub struct EventFilter {
    root: PathBuf,
    patterns: Vec<WatchPattern>,
    ignore: Vec<Vec<String>>,
    settle: Duration,
    armed_at: OnceLock<Instant>,
}

impl EventFilter {
    pub fn new(root: PathBuf, patterns: Vec<WatchPattern>, ignore: &[String], settle: Duration) -> Self {
        let ignore = ignore
            .iter()
            .map(|entry| {
                Path::new(entry)
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|parts| !parts.is_empty())
            .collect();

        Self {
            root,
            patterns,
            ignore,
            settle,
            armed_at: OnceLock::new(),
        }
    }

    /// Start forwarding events once `settle` has passed from now
    ///
    /// Called when the subscription is established. Until then, and during the
    /// settle period, everything is dropped.
    pub fn arm(&self) {
        self.arm_at(Instant::now());
    }

    pub fn arm_at(&self, now: Instant) {
        let _ = self.armed_at.set(now + self.settle);
    }

    pub fn patterns(&self) -> &[WatchPattern] {
        &self.patterns
    }

    /// True when some component sequence of `path` below the root is excluded
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        self.ignore
            .iter()
            .any(|entry| parts.windows(entry.len()).any(|window| window == entry.as_slice()))
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn translate(&self, event: &notify::Event) -> Vec<ChangeEvent> {
        self.translate_at(event, Instant::now())
    }

    /// One change event per path that survives filtering
    pub fn translate_at(&self, event: &notify::Event, now: Instant) -> Vec<ChangeEvent> {
        match self.armed_at.get() {
            Some(armed) if now >= *armed => {}
            _ => {
                trace!(kind = ?event.kind, "EventFilter::translate_at: not settled, dropping");
                return Vec::new();
            }
        }

        let mut changes = Vec::new();
        for (index, path) in event.paths.iter().enumerate() {
            let Some(kind) = classify(&event.kind, index) else {
                continue;
            };
            if self.is_ignored(path) {
                trace!(?path, "EventFilter::translate_at: ignored directory");
                continue;
            }
            if !self.matches(path) {
                trace!(?path, "EventFilter::translate_at: no pattern matched");
                continue;
            }
            debug!(?kind, ?path, "EventFilter::translate_at: accepted");
            changes.push(ChangeEvent::new(kind, path.clone()));
        }
        changes
    }
}

/// Map a notify event kind to a change kind for the path at `index`
///
/// Access events are not changes. A two-path rename is a removal of the
/// first path and an addition of the second.
pub fn classify(kind: &EventKind, index: usize) -> Option<ChangeKind> {
    match kind {
        EventKind::Access(_) => None,
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::Other),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if index == 0 => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Some(ChangeKind::Added),
        EventKind::Modify(_) => Some(ChangeKind::Changed),
        EventKind::Any | EventKind::Other => Some(ChangeKind::Other),
    }
}
