//! File sync controller.
//!
//! [`FileSyncController`] mediates between user intents and a
//! [`RemoteObjectStore`], keeping a [`LocalCatalog`] that is an eventually
//! accurate mirror of the caller's namespace.
//!
//! Every operation issues exactly one store call.  Failures never escape:
//! they are logged, kept as [`Diagnostic`]s, and leave the catalog in its
//! last known good state.  Successful uploads and deletes patch the catalog
//! optimistically without re-listing, so the catalog can drift from the
//! store until the next [`refresh`](FileSyncController::refresh).
//!
//! Operations take `&self` and may interleave freely; catalog patches from
//! racing operations resolve as last-writer-wins.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{LocalCatalog, ObjectRecord};
use crate::config::Config;
use crate::errors::{Diagnostic, TransportError};
use crate::metrics;
use crate::storage::backend::{ProgressCallback, RemoteObjectStore};
use crate::upload::{
    target_key, Clock, KeyClock, UploadFile, UploadRegistry, UploadStatus, UploadTask,
};

const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 32;

/// Keeps the local catalog in step with the remote store.
pub struct FileSyncController {
    store: Arc<dyn RemoteObjectStore>,
    owner: String,
    keys: KeyClock,
    catalog: watch::Sender<LocalCatalog>,
    uploads: Arc<UploadRegistry>,
    diagnostics: Mutex<VecDeque<Diagnostic>>,
    diagnostics_capacity: usize,
}

/// Removes an upload from the registry when the upload future completes
/// or is dropped.
struct InFlight<'a> {
    registry: &'a UploadRegistry,
    key: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.finish(self.key);
    }
}

impl FileSyncController {
    /// Create a controller for `owner` on top of `store`.  The catalog
    /// starts empty; call [`refresh`](Self::refresh) to populate it.
    pub fn new(store: Arc<dyn RemoteObjectStore>, owner: impl Into<String>) -> Self {
        let (catalog, _) = watch::channel(LocalCatalog::new());
        Self {
            store,
            owner: owner.into(),
            keys: KeyClock::default(),
            catalog,
            uploads: Arc::new(UploadRegistry::new()),
            diagnostics: Mutex::new(VecDeque::new()),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }

    /// Create a controller using the owner and sync settings in `config`.
    pub fn from_config(store: Arc<dyn RemoteObjectStore>, config: &Config) -> Self {
        Self::new(store, config.owner.id.clone())
            .with_diagnostics_capacity(config.sync.diagnostics_capacity)
    }

    /// Use `clock` for upload key timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.keys = KeyClock::new(clock);
        self
    }

    pub fn with_diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity.max(1);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Key prefix scoping this owner's objects.
    pub fn owner_namespace(&self) -> String {
        format!("{}/", self.owner)
    }

    // ── Intents ────────────────────────────────────────────────────

    /// Replace the catalog with a fresh listing of the owner namespace.
    ///
    /// Returns the number of records, or `None` if the listing failed (the
    /// catalog is then untouched).  No retry.
    pub async fn refresh(&self) -> Option<usize> {
        let started = Instant::now();
        let prefix = self.owner_namespace();
        debug!("refresh: listing prefix '{}'", prefix);

        let listed = match self.store.list(&prefix).await {
            Ok(listed) => listed,
            Err(err) => {
                metrics::record_sync_operation("refresh", false, started.elapsed().as_secs_f64());
                self.diagnose("refresh", None, &err);
                return None;
            }
        };

        let now = Utc::now();
        let mut count = 0;
        self.catalog.send_modify(|catalog| {
            catalog.replace(listed.into_iter().map(|raw| ObjectRecord::from_raw(raw, now)));
            count = catalog.len();
        });

        metrics::record_sync_operation("refresh", true, started.elapsed().as_secs_f64());
        metrics::record_catalog_size(count);
        info!("refresh: {} objects under '{}'", count, prefix);
        Some(count)
    }

    /// Upload `file` to `{owner}/{timestamp}-{name}` and append it to the
    /// catalog on success.
    ///
    /// Progress is tracked per upload while the store call is pending.  On
    /// failure the catalog is unchanged and `None` is returned.
    pub async fn upload(&self, file: UploadFile) -> Option<ObjectRecord> {
        let started = Instant::now();
        let UploadFile {
            name,
            data,
            content_type,
        } = file;
        let key = target_key(&self.owner, self.keys.next(), &name);
        let size = data.len() as u64;

        self.uploads.begin(&key, size);
        let result = {
            let _in_flight = InFlight {
                registry: &self.uploads,
                key: &key,
            };
            let registry = Arc::clone(&self.uploads);
            let progress_key = key.clone();
            let on_progress: ProgressCallback = Arc::new(move |loaded, total| {
                registry.progress(&progress_key, loaded, total);
            });
            debug!("upload: key={} bytes={} type={}", key, size, content_type);
            self.store.put(&key, data, &content_type, on_progress).await
        };

        if let Err(err) = result {
            metrics::record_sync_operation("upload", false, started.elapsed().as_secs_f64());
            self.diagnose("upload", Some(&key), &err);
            return None;
        }

        let record = ObjectRecord::new(key, size, content_type, Utc::now());
        let mut count = 0;
        self.catalog.send_modify(|catalog| {
            catalog.upsert(record.clone());
            count = catalog.len();
        });

        metrics::record_sync_operation("upload", true, started.elapsed().as_secs_f64());
        metrics::record_bytes_uploaded(size);
        metrics::record_catalog_size(count);
        info!("upload: stored {} ({} bytes)", record.key, size);
        Some(record)
    }

    /// Delete `key` remotely and drop it from the catalog on success.
    pub async fn remove(&self, key: &str) -> bool {
        let started = Instant::now();
        if let Err(err) = self.store.remove(key).await {
            metrics::record_sync_operation("remove", false, started.elapsed().as_secs_f64());
            self.diagnose("remove", Some(key), &err);
            return false;
        }

        let mut count = 0;
        self.catalog.send_modify(|catalog| {
            catalog.remove(key);
            count = catalog.len();
        });

        metrics::record_sync_operation("remove", true, started.elapsed().as_secs_f64());
        metrics::record_catalog_size(count);
        info!("remove: deleted {}", key);
        true
    }

    /// Time-limited reference for viewing `key`, or `None` on failure.
    pub async fn resolve_access_url(&self, key: &str) -> Option<String> {
        self.resolve_url("resolve_access_url", key, false).await
    }

    /// Time-limited reference for downloading `key`, or `None` on failure.
    pub async fn resolve_download_url(&self, key: &str) -> Option<String> {
        self.resolve_url("resolve_download_url", key, true).await
    }

    async fn resolve_url(&self, operation: &'static str, key: &str, download: bool) -> Option<String> {
        let started = Instant::now();
        match self.store.get_url(key, download).await {
            Ok(url) => {
                metrics::record_sync_operation(operation, true, started.elapsed().as_secs_f64());
                debug!("{}: resolved {}", operation, key);
                Some(url)
            }
            Err(err) => {
                metrics::record_sync_operation(operation, false, started.elapsed().as_secs_f64());
                self.diagnose(operation, Some(key), &err);
                None
            }
        }
    }

    // ── Read-only views ────────────────────────────────────────────

    /// Snapshot of the catalog records.
    pub fn catalog(&self) -> Vec<ObjectRecord> {
        self.catalog.borrow().records().to_vec()
    }

    /// Receiver notified on every catalog change.
    pub fn watch_catalog(&self) -> watch::Receiver<LocalCatalog> {
        self.catalog.subscribe()
    }

    /// Aggregate upload status: idle, or in flight with a percentage.
    pub fn upload_status(&self) -> UploadStatus {
        self.uploads.status()
    }

    /// Receiver notified on every upload progress change.
    pub fn watch_uploads(&self) -> watch::Receiver<UploadStatus> {
        self.uploads.subscribe()
    }

    /// Per-upload progress, in start order.
    pub fn uploads(&self) -> Vec<UploadTask> {
        self.uploads.tasks()
    }

    /// Most recent diagnostics, oldest first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .expect("mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn last_diagnostic(&self) -> Option<Diagnostic> {
        self.diagnostics
            .lock()
            .expect("mutex poisoned")
            .back()
            .cloned()
    }

    fn diagnose(&self, operation: &'static str, key: Option<&str>, err: &TransportError) {
        warn!(
            operation,
            key = key.unwrap_or(""),
            error = %err,
            "file sync operation failed"
        );
        let mut diagnostics = self.diagnostics.lock().expect("mutex poisoned");
        if diagnostics.len() >= self.diagnostics_capacity {
            diagnostics.pop_front();
        }
        diagnostics.push_back(Diagnostic::new(operation, key, err));
    }
}
