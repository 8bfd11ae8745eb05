//! Importer services
//!
//! Registry and event plumbing, the track pipeline and the background
//! loops (filesystem watcher, batch dispatcher, worker pool) that drive it.

pub mod connections;
pub mod dispatcher;
pub mod event_queue;
pub mod file_scanner;
pub mod identity;
pub mod pipeline;
pub mod registry;
pub mod watcher;
pub mod worker_pool;

pub use connections::{ConnectionRegistry, SessionSender};
pub use dispatcher::{Dispatcher, FlushOutcome};
pub use event_queue::{EventQueue, EventReceiver};
pub use file_scanner::{FileScanner, ScanError};
pub use identity::TrackId;
pub use pipeline::{AddMode, FileEventSink, SaveOptions, TrackProcessor};
pub use registry::{Removal, Snapshot, SnapshotView, TrackRegistry};
pub use watcher::{FsWatcher, RenameTracker, WatchEvent};
pub use worker_pool::{fault_channel, FaultReceiver, FaultSink, StageFault, WorkerPool};
