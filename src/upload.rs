//! Upload bookkeeping: target key construction, per-task progress, and the
//! aggregate status the presentation layer polls or watches.

use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A file the user asked to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original file name (no directories).
    pub name: String,
    pub data: Bytes,
    pub content_type: String,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?;
        let data = tokio::fs::read(path).await?;
        let content_type = guess_content_type(&name);
        Ok(Self::new(name, data, content_type))
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Content type registered for a file name's extension, or
/// `application/octet-stream`.
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string()
}

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing millisecond timestamps, so two uploads
/// of the same file name by one owner never collide even inside one
/// millisecond or across a backwards clock step.
pub struct KeyClock {
    clock: Arc<dyn Clock>,
    last: AtomicU64,
}

impl KeyClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let now = self.clock.now_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for KeyClock {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// `{owner}/{timestamp}-{file_name}`.
pub fn target_key(owner: &str, timestamp: u64, file_name: &str) -> String {
    format!("{owner}/{timestamp}-{file_name}")
}

/// `round(transferred / total * 100)`, capped at 100; 0 when total is 0.
pub fn percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = ((transferred as f64 / total as f64) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// One in-flight upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    pub target_key: String,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
}

impl UploadTask {
    pub fn percent(&self) -> u8 {
        percent(self.transferred_bytes, self.total_bytes)
    }
}

/// What the presentation layer shows for uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    pub in_flight: bool,
    pub percent: u8,
}

impl UploadStatus {
    pub const IDLE: UploadStatus = UploadStatus {
        in_flight: false,
        percent: 0,
    };

    /// Single task: its percent.  Several: byte-weighted aggregate.
    fn from_tasks(tasks: &[UploadTask]) -> Self {
        if tasks.is_empty() {
            return Self::IDLE;
        }
        let transferred = tasks
            .iter()
            .map(|t| t.transferred_bytes)
            .fold(0u64, u64::saturating_add);
        let total = tasks
            .iter()
            .map(|t| t.total_bytes)
            .fold(0u64, u64::saturating_add);
        Self {
            in_flight: true,
            percent: percent(transferred, total),
        }
    }
}

/// In-flight uploads, in start order.
pub struct UploadRegistry {
    tasks: Mutex<Vec<UploadTask>>,
    status: watch::Sender<UploadStatus>,
}

impl Default for UploadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadRegistry {
    pub fn new() -> Self {
        let (status, _) = watch::channel(UploadStatus::IDLE);
        Self {
            tasks: Mutex::new(Vec::new()),
            status,
        }
    }

    fn with_tasks<R>(&self, f: impl FnOnce(&mut Vec<UploadTask>) -> R) -> R {
        let mut tasks = self.tasks.lock().expect("mutex poisoned");
        let result = f(&mut tasks);
        self.status.send_replace(UploadStatus::from_tasks(&tasks));
        result
    }

    /// Start tracking an upload to `target_key`.
    pub fn begin(&self, target_key: &str, total_bytes: u64) {
        self.with_tasks(|tasks| {
            tasks.push(UploadTask {
                target_key: target_key.to_string(),
                total_bytes,
                transferred_bytes: 0,
            })
        });
    }

    /// Record a progress report.  Values are taken as given: a report
    /// lower than the previous one moves the percentage backwards.
    pub fn progress(&self, target_key: &str, loaded: u64, total: u64) {
        self.with_tasks(|tasks| {
            if let Some(task) = tasks.iter_mut().find(|t| t.target_key == target_key) {
                task.transferred_bytes = loaded;
                task.total_bytes = total;
            }
        });
    }

    /// Stop tracking `target_key`.
    pub fn finish(&self, target_key: &str) {
        self.with_tasks(|tasks| tasks.retain(|t| t.target_key != target_key));
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.tasks.lock().expect("mutex poisoned").clone()
    }

    pub fn task(&self, target_key: &str) -> Option<UploadTask> {
        self.tasks
            .lock()
            .expect("mutex poisoned")
            .iter()
            .find(|t| t.target_key == target_key)
            .cloned()
    }

    pub fn status(&self) -> UploadStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_format() {
        assert_eq!(target_key("u1", 1234, "report.pdf"), "u1/1234-report.pdf");
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(10, 10), 100);
        assert_eq!(percent(5, 0), 0);
        assert_eq!(percent(20, 10), 100);
    }

    #[test]
    fn test_key_clock_strictly_increasing_on_fixed_clock() {
        let clock = KeyClock::new(Arc::new(FixedClock(1_000)));
        assert_eq!(clock.next(), 1_000);
        assert_eq!(clock.next(), 1_001);
        assert_eq!(clock.next(), 1_002);
    }

    #[test]
    fn test_key_clock_follows_real_time() {
        let clock = KeyClock::default();
        let a = clock.next();
        let b = clock.next();
        assert!(b > a);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("report.PDF"), "application/pdf");
        assert_eq!(guess_content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(
            guess_content_type("budget.xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(
            guess_content_type("letter.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(guess_content_type("clip.webm"), "video/webm");
        assert_eq!(guess_content_type("backup.tar"), "application/x-tar");
        assert_eq!(guess_content_type("README"), "application/octet-stream");
        assert_eq!(
            guess_content_type("archive.notarealext"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_aggregate_saturates_on_absurd_reports() {
        let registry = UploadRegistry::new();
        registry.begin("u1/1-a", 10);
        registry.begin("u1/2-b", 10);
        registry.progress("u1/1-a", u64::MAX, u64::MAX);
        registry.progress("u1/2-b", u64::MAX, u64::MAX);
        let status = registry.status();
        assert!(status.in_flight);
        assert_eq!(status.percent, 100);
    }

    #[test]
    fn test_registry_single_task_lifecycle() {
        let registry = UploadRegistry::new();
        assert_eq!(registry.status(), UploadStatus::IDLE);

        registry.begin("u1/1-a", 200);
        assert_eq!(registry.status(), UploadStatus { in_flight: true, percent: 0 });

        registry.progress("u1/1-a", 50, 200);
        assert_eq!(registry.status().percent, 25);
        assert_eq!(registry.task("u1/1-a").unwrap().percent(), 25);

        registry.finish("u1/1-a");
        assert_eq!(registry.status(), UploadStatus::IDLE);
        assert!(registry.tasks().is_empty());
    }

    #[test]
    fn test_registry_does_not_enforce_monotonic_progress() {
        let registry = UploadRegistry::new();
        registry.begin("u1/1-a", 100);
        registry.progress("u1/1-a", 80, 100);
        registry.progress("u1/1-a", 40, 100);
        assert_eq!(registry.status().percent, 40);
    }

    #[test]
    fn test_registry_aggregates_by_bytes() {
        let registry = UploadRegistry::new();
        registry.begin("u1/1-small", 100);
        registry.begin("u1/2-large", 300);
        registry.progress("u1/1-small", 100, 100);

        assert_eq!(registry.status().percent, 25);
        assert_eq!(registry.task("u1/1-small").unwrap().percent(), 100);
        assert_eq!(registry.task("u1/2-large").unwrap().percent(), 0);

        registry.finish("u1/1-small");
        assert_eq!(registry.status(), UploadStatus { in_flight: true, percent: 0 });
    }

    #[tokio::test]
    async fn test_registry_notifies_watchers() {
        let registry = UploadRegistry::new();
        let mut rx = registry.subscribe();
        registry.begin("u1/1-a", 10);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().in_flight);
    }

    #[tokio::test]
    async fn test_upload_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.len(), 5);
        assert_eq!(file.content_type, "text/plain");
    }
}
