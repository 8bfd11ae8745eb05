//! Track lifecycle pipeline
//!
//! Every discovered file is handed to a worker job (`process_add`) which
//! waits for the file to stop growing (watch-triggered adds only), renames
//! `.aiff` to `.aif`, and then branches on format:
//!
//! - convertible files enter `CONVERTING` and are converted; the converted
//!   file re-enters the pipeline through its own created event
//! - unsupported files are dropped
//! - valid files have their tags loaded and are published to the registry,
//!   after which key estimation and/or Beatport enrichment are scheduled as
//!   independent jobs
//!
//! Processing entries are added when a stage is scheduled and completed by
//! the job running it. A job that fails leaves its entry in place and is
//! reported to the fault sink.
//!
//! Client saves and filesystem removals enter here as well.

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use tune_common::events::{EventItem, TrackProcess};
use tune_common::Error;

use crate::external::{is_valid_camelot, pad_key, Collaborators};
use crate::models::format::needs_aif_rename;
use crate::models::{TrackFormat, TrackRecord, TrackTags};
use crate::services::file_scanner::{FileScanner, ScanError};
use crate::services::identity::TrackId;
use crate::services::registry::{Removal, TrackRegistry};
use crate::services::worker_pool::WorkerPool;
use crate::utils::paths::determine_path;

/// Default interval between size polls while a file is being copied in
pub const DEFAULT_STABILITY_POLL: Duration = Duration::from_millis(500);

/// How a file was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Found by the startup scan; assumed complete
    Scanned,
    /// Reported by the filesystem watcher; may still be written to
    Watched,
}

/// Options accompanying a client save
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Library root to move saved tracks into
    pub migrate_path: Option<PathBuf>,
    /// Additional roots that receive a symlink to each saved track
    pub link_paths: Vec<PathBuf>,
}

/// Receiver of filesystem notifications
pub trait FileEventSink: Send + Sync {
    fn file_created(&self, path: PathBuf);
    fn file_deleted(&self, path: PathBuf);
}

struct ProcessorInner {
    registry: Arc<TrackRegistry>,
    pool: WorkerPool,
    collaborators: Collaborators,
    stability_poll: Duration,
    /// Held while tags are written or a track is moved, so the last write
    /// always carries the registry's latest state
    files: Mutex<()>,
}

impl ProcessorInner {
    fn lock_files(&self) -> MutexGuard<'_, ()> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entry point for adds, removes and saves
///
/// Cheap to clone; clones share the registry and worker pool.
#[derive(Clone)]
pub struct TrackProcessor {
    inner: Arc<ProcessorInner>,
}

impl TrackProcessor {
    pub fn new(
        registry: Arc<TrackRegistry>,
        pool: WorkerPool,
        collaborators: Collaborators,
        stability_poll: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                registry,
                pool,
                collaborators,
                stability_poll,
                files: Mutex::new(()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.inner.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Queue a discovered file for processing
    ///
    /// AppleDouble sidecar files (`._*`) are dropped without touching them.
    pub fn add(&self, path: PathBuf, mode: AddMode) {
        let is_sidecar = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("._"))
            .unwrap_or(false);
        if is_sidecar {
            debug!(path = %path.display(), "Ignoring sidecar file");
            return;
        }

        let this = self.clone();
        let label = format!("add {}", path.display());
        self.inner
            .pool
            .submit(label, move || this.process_add(path, mode));
    }

    /// Queue every importable or convertible file under the import root
    pub fn add_all(&self) -> Result<usize, ScanError> {
        let files = FileScanner::new().scan(self.inner.registry.import_root())?;
        let count = files.len();
        for path in files {
            self.add(path, AddMode::Scanned);
        }
        info!("Queued {} files from import directory", count);
        Ok(count)
    }

    /// Handle a file disappearing from the import root
    pub fn remove(&self, path: &Path) -> Removal {
        let id = TrackId::from_path(path);
        let removal = self.inner.registry.remove_track(&id);
        match removal {
            Removal::Unknown => debug!(path = %path.display(), "Removed file was not tracked"),
            Removal::Reported => info!(id = %id, path = %path.display(), "Track removed"),
            Removal::Suppressed => debug!(id = %id, path = %path.display(), "Track migrated"),
        }
        removal
    }

    /// Queue one independent save job per edited track
    pub fn save_all(&self, edits: Vec<EventItem>, options: SaveOptions) {
        let options = Arc::new(options);
        for edit in edits {
            let this = self.clone();
            let options = Arc::clone(&options);
            let label = format!(
                "save {}",
                edit.get("id").and_then(Value::as_str).unwrap_or("<no id>")
            );
            self.inner
                .pool
                .submit(label, move || this.save_track(edit, &options));
        }
    }

    fn process_add(&self, path: PathBuf, mode: AddMode) -> anyhow::Result<()> {
        let inner = &self.inner;

        if mode == AddMode::Watched && !self.wait_until_stable(&path)? {
            debug!(path = %path.display(), "File vanished before it settled");
            return Ok(());
        }

        let mut path = path;
        if needs_aif_rename(&path) {
            let renamed = path.with_extension("aif");
            fs::rename(&path, &renamed)
                .with_context(|| format!("Renaming {} to .aif", path.display()))?;
            debug!(from = %path.display(), to = %renamed.display(), "Normalized extension");
            path = renamed;
        }

        let id = TrackId::from_path(&path);

        match TrackFormat::of(&path) {
            TrackFormat::Convertible => {
                inner.registry.add_processing(&id, TrackProcess::Converting);
                let this = self.clone();
                let label = format!("convert {}", path.display());
                inner
                    .pool
                    .submit(label, move || this.convert_track(&id, &path));
                return Ok(());
            }
            TrackFormat::Unsupported => {
                debug!(path = %path.display(), "Ignoring unsupported format");
                return Ok(());
            }
            TrackFormat::Valid => {}
        }

        let (mut tags, artwork) = inner
            .collaborators
            .tags
            .load(&path)
            .with_context(|| format!("Loading tags from {}", path.display()))?;

        let needs_key = !tags.key.as_deref().map(is_valid_camelot).unwrap_or(false);
        if needs_key {
            tags.key = None;
        }

        let record = TrackRecord::new(path, tags, artwork);
        let identified = inner.collaborators.lookup.has_identifying_metadata(&record);
        let key_path = record.path.clone();
        let lookup_record = identified.then(|| record.clone());

        info!(id = %id, path = %record.path.display(), "Track discovered");
        inner.registry.publish(record);

        if needs_key {
            inner.registry.add_processing(&id, TrackProcess::KeyComputing);
            let this = self.clone();
            let id = id.clone();
            let label = format!("compute key {}", key_path.display());
            inner
                .pool
                .submit(label, move || this.compute_key(&id, &key_path));
        }

        if let Some(record) = lookup_record {
            inner.registry.add_processing(&id, TrackProcess::BeatportImport);
            let this = self.clone();
            let label = format!("beatport {}", record.path.display());
            inner
                .pool
                .submit(label, move || this.beatport_update(&id, record));
        }

        Ok(())
    }

    /// Poll until two consecutive size reads agree
    ///
    /// Returns false if the file disappeared while waiting.
    fn wait_until_stable(&self, path: &Path) -> anyhow::Result<bool> {
        let Some(mut size) = file_size(path)? else {
            return Ok(false);
        };

        loop {
            std::thread::sleep(self.inner.stability_poll);
            let Some(latest) = file_size(path)? else {
                return Ok(false);
            };
            if latest == size {
                return Ok(true);
            }
            size = latest;
        }
    }

    fn convert_track(&self, id: &TrackId, path: &Path) -> anyhow::Result<()> {
        let inner = &self.inner;
        let converted = inner
            .collaborators
            .converter
            .convert(path)
            .with_context(|| format!("Converting {}", path.display()))?;
        debug!(id = %id, path = %converted.display(), "Conversion finished");

        inner
            .registry
            .complete_processing(id, TrackProcess::Converting, EventItem::new())?;
        Ok(())
    }

    fn compute_key(&self, id: &TrackId, path: &Path) -> anyhow::Result<()> {
        let inner = &self.inner;
        let key = inner
            .collaborators
            .key_estimator
            .estimate_key(path)
            .with_context(|| format!("Estimating key of {}", path.display()))?;
        let key = pad_key(&key);
        info!(id = %id, key = %key, "Key computed");

        let mut fields = EventItem::new();
        fields.insert("key".to_string(), Value::String(key));
        inner
            .registry
            .complete_processing(id, TrackProcess::KeyComputing, fields)?;

        self.persist(id)
    }

    fn beatport_update(&self, id: &TrackId, record: TrackRecord) -> anyhow::Result<()> {
        let inner = &self.inner;
        let fields = inner
            .collaborators
            .lookup
            .lookup(&record)
            .with_context(|| format!("Looking up {}", record.path.display()))?;
        info!(id = %id, fields = fields.len(), "Beatport details merged");

        inner
            .registry
            .complete_processing(id, TrackProcess::BeatportImport, fields)?;

        self.persist(id)
    }

    /// Write the registry's current view of a track back to its file
    fn persist(&self, id: &TrackId) -> anyhow::Result<()> {
        let _files = self.inner.lock_files();
        match self.inner.registry.get(id) {
            Some(record) => self
                .inner
                .collaborators
                .tags
                .save(&record)
                .with_context(|| format!("Saving tags to {}", record.path.display())),
            None => {
                debug!(id = %id, "Track removed before its tags could be saved");
                Ok(())
            }
        }
    }

    fn save_track(&self, edit: EventItem, options: &SaveOptions) -> anyhow::Result<()> {
        let inner = &self.inner;
        let id = edit
            .get("id")
            .and_then(Value::as_str)
            .map(TrackId::from_string)
            .ok_or_else(|| Error::InvalidInput("Save request without an id".to_string()))?;

        if !inner.registry.contains(&id) {
            return Err(Error::NotFound(format!("Track {}", id)).into());
        }

        // An uncached artwork key leaves the track without artwork
        let artwork = match artwork_key(&edit).and_then(|key| inner.registry.cached_artwork(&key)) {
            Some(cached) => vec![inner.collaborators.artwork.normalize(&cached)?],
            None => Vec::new(),
        };
        let tags = TrackTags::from_edits(&edit);

        let _files = inner.lock_files();
        let record = inner
            .registry
            .apply_save(&id, tags, artwork)
            .ok_or_else(|| Error::NotFound(format!("Track {}", id)))?;
        debug!(id = %id, "Edits applied");

        inner
            .collaborators
            .tags
            .save(&record)
            .with_context(|| format!("Saving tags to {}", record.path.display()))?;

        let standard_path = determine_path(&record);
        let mut location = record.path.clone();

        if let Some(root) = &options.migrate_path {
            inner.registry.expect_removal(id.clone());

            let dest = root.join(&standard_path);
            move_file(&record.path, &dest)
                .with_context(|| format!("Moving {} to {}", record.path.display(), dest.display()))?;
            info!(id = %id, dest = %dest.display(), "Track migrated");

            if !inner.registry.relocate(&id, dest.clone()) {
                debug!(id = %id, "Track left the registry during save");
            }
            location = dest;
        }

        for link_root in &options.link_paths {
            let link = link_root.join(&standard_path);
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent)?;
            }
            symlink(&location, &link).with_context(|| format!("Linking {}", link.display()))?;
            debug!(id = %id, link = %link.display(), "Track linked");
        }

        inner.registry.emit_saved(&id);
        Ok(())
    }
}

impl FileEventSink for TrackProcessor {
    fn file_created(&self, path: PathBuf) {
        self.add(path, AddMode::Watched);
    }

    fn file_deleted(&self, path: PathBuf) {
        self.remove(&path);
    }
}

/// Size of `path`, or `None` if it does not exist
fn file_size(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Artwork key named by an edit, as a string or the first element of a list
fn artwork_key(edit: &EventItem) -> Option<String> {
    match edit.get("artwork")? {
        Value::String(key) => Some(key.clone()),
        Value::Array(keys) => keys.first()?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Move a file, copying when a rename crosses filesystems
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(from = %from.display(), error = %e, "Rename failed, copying instead");
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}
