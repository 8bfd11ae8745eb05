//! Filesystem watch adapter
//!
//! Translates raw `notify` events for the import root into created/deleted
//! notifications for the pipeline. Only non-directory created and deleted
//! events reach the pipeline.
//!
//! Renames are paired by their tracker cookie. A rename whose source and
//! destination are both inside the tree is a move and is ignored (this
//! covers the pipeline's own `.aiff` -> `.aif` rename). A rename source whose
//! destination does not show up within the grace period left the tree and
//! counts as deleted; a destination without a known source entered the tree
//! and counts as created.

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::pipeline::FileEventSink;

/// Default time a rename source waits for its destination
pub const DEFAULT_RENAME_GRACE: Duration = Duration::from_millis(500);

/// Kind of change reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Other,
}

/// Normalized filesystem event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub is_directory: bool,
    pub change: ChangeKind,
}

impl WatchEvent {
    fn new(path: PathBuf, is_directory: bool, change: ChangeKind) -> Self {
        Self {
            path,
            is_directory,
            change,
        }
    }
}

/// Pairs rename halves and converts raw events into [`WatchEvent`]s
#[derive(Debug)]
pub struct RenameTracker {
    pending: HashMap<usize, (PathBuf, Instant)>,
    grace: Duration,
}

impl RenameTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            grace,
        }
    }

    /// Translate one raw event observed at `now`
    pub fn translate(&mut self, event: Event, now: Instant) -> Vec<WatchEvent> {
        let cookie = event.attrs.tracker();
        let mut paths = event.paths.into_iter();

        match event.kind {
            EventKind::Create(kind) => paths
                .map(|p| {
                    let is_dir = kind == CreateKind::Folder || p.is_dir();
                    WatchEvent::new(p, is_dir, ChangeKind::Created)
                })
                .collect(),
            EventKind::Remove(kind) => paths
                .map(|p| WatchEvent::new(p, kind == RemoveKind::Folder, ChangeKind::Deleted))
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                debug!("Ignoring move inside import directory");
                Vec::new()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let Some(path) = paths.next() else {
                    return Vec::new();
                };
                match cookie {
                    Some(cookie) => {
                        self.pending.insert(cookie, (path, now));
                        Vec::new()
                    }
                    None => vec![WatchEvent::new(path, false, ChangeKind::Deleted)],
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(path) = paths.next() else {
                    return Vec::new();
                };
                let matched = cookie.and_then(|c| self.pending.remove(&c)).is_some();
                if matched {
                    Vec::new()
                } else {
                    let is_dir = path.is_dir();
                    vec![WatchEvent::new(path, is_dir, ChangeKind::Created)]
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .map(|p| {
                    if p.exists() {
                        let is_dir = p.is_dir();
                        WatchEvent::new(p, is_dir, ChangeKind::Created)
                    } else {
                        WatchEvent::new(p, false, ChangeKind::Deleted)
                    }
                })
                .collect(),
            _ => paths
                .map(|p| WatchEvent::new(p, false, ChangeKind::Other))
                .collect(),
        }
    }

    /// Rename sources whose grace period ran out by `now`, as deletions
    pub fn expire(&mut self, now: Instant) -> Vec<WatchEvent> {
        let grace = self.grace;
        let mut expired = Vec::new();
        self.pending.retain(|_, (path, seen)| {
            if now.duration_since(*seen) >= grace {
                expired.push(WatchEvent::new(path.clone(), false, ChangeKind::Deleted));
                false
            } else {
                true
            }
        });
        expired
    }
}

/// Forward a normalized event to the pipeline
pub fn dispatch(sink: &dyn FileEventSink, event: WatchEvent) {
    if event.is_directory {
        return;
    }

    match event.change {
        ChangeKind::Created => sink.file_created(event.path),
        ChangeKind::Deleted => sink.file_deleted(event.path),
        ChangeKind::Other => {}
    }
}

/// Recursive watcher over the import root
pub struct FsWatcher {
    root: PathBuf,
    sink: Arc<dyn FileEventSink>,
    grace: Duration,
}

impl FsWatcher {
    pub fn new(root: impl AsRef<Path>, sink: Arc<dyn FileEventSink>, grace: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            sink,
            grace,
        }
    }

    /// Start watching; events are delivered until `shutdown` is cancelled
    pub fn start(self, shutdown: CancellationToken) -> notify::Result<JoinHandle<()>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver is gone only after shutdown
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        info!("Watching {}", self.root.display());

        Ok(tokio::spawn(self.run(watcher, rx, shutdown)))
    }

    async fn run(
        self,
        watcher: RecommendedWatcher,
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        shutdown: CancellationToken,
    ) {
        let mut tracker = RenameTracker::new(self.grace);
        let tick_period = (self.grace / 2).max(Duration::from_millis(50));
        let mut ticker = tokio::time::interval(tick_period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Some(Ok(event)) => {
                        for e in tracker.translate(event, Instant::now()) {
                            dispatch(self.sink.as_ref(), e);
                        }
                    }
                    Some(Err(e)) => warn!("Filesystem watch error: {}", e),
                    None => break,
                },
                _ = ticker.tick() => {
                    for e in tracker.expire(Instant::now()) {
                        dispatch(self.sink.as_ref(), e);
                    }
                }
            }
        }

        drop(watcher);
        info!("Stopped watching {}", self.root.display());
    }
}
