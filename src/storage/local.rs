//! Local filesystem object store.
//!
//! Objects are stored as files under a root directory, using the key as
//! the relative path (e.g. `u1/1700000000000-report.pdf`).  The content
//! type of each object lives in a JSON sidecar under `.meta/`.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::backend::{ProgressCallback, RawObjectMeta, RemoteObjectStore, StoreFuture};
use crate::errors::TransportError;

/// Characters escaped when building `file://` URLs.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const TMP_DIR: &str = ".tmp";
const META_DIR: &str = ".meta";
const WRITE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
}

/// Stores objects on the local filesystem.
pub struct LocalStore {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalStore {
    /// Create a new `LocalStore` rooted at `root`.
    ///
    /// The directory (and its `.tmp`/`.meta` subdirectories) will be
    /// created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(TMP_DIR))?;
        std::fs::create_dir_all(root.join(META_DIR))?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Resolve a key to its object path, rejecting keys that would escape
    /// the root, collide with the bookkeeping directories, or name the
    /// same file as some other key.
    fn resolve(&self, key: &str) -> Result<PathBuf, String> {
        if key.is_empty() {
            return Err(format!("invalid key: '{key}'"));
        }
        for segment in key.split('/') {
            match segment {
                ".." => return Err(format!("path traversal detected in key: {key}")),
                "" | "." => return Err(format!("non-canonical key: '{key}'")),
                _ if segment.contains('\\') => {
                    return Err(format!("invalid character in key: {key}"))
                }
                _ => {}
            }
        }
        if let Some(first) = key.split('/').next() {
            if first == TMP_DIR || first == META_DIR {
                return Err(format!("reserved key: {key}"));
            }
        }
        Ok(self.root.join(key))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(format!("tmp-{}", uuid::Uuid::new_v4()))
    }

    fn read_content_type(&self, key: &str) -> Option<String> {
        let raw = std::fs::read(self.sidecar_path(key)).ok()?;
        serde_json::from_slice::<Sidecar>(&raw)
            .ok()
            .map(|s| s.content_type)
    }

    /// Every object key under the root, skipping the bookkeeping dirs.
    fn collect_keys(&self) -> Result<Vec<String>, walkdir::Error> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || !is_reserved(e.file_name()));

        let mut keys = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn write_object(
        &self,
        key: &str,
        data: &Bytes,
        content_type: &str,
        on_progress: &ProgressCallback,
    ) -> Result<(), TransportError> {
        let err = |e: std::io::Error| TransportError::new("put", e);
        let final_path = self.resolve(key).map_err(|e| TransportError::new("put", e))?;
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent).map_err(err)?;
        }

        let tmp_path = self.temp_path();
        if let Err(e) = write_temp(&tmp_path, data, on_progress)
            .and_then(|()| std::fs::rename(&tmp_path, &final_path))
        {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err(e));
        }

        let sidecar = self.sidecar_path(key);
        if let Some(parent) = sidecar.parent() {
            std::fs::create_dir_all(parent).map_err(err)?;
        }
        let body = serde_json::to_vec(&Sidecar {
            content_type: content_type.to_string(),
        })
        .map_err(|e| TransportError::new("put", e))?;
        std::fs::write(&sidecar, body).map_err(err)?;
        Ok(())
    }
}

fn is_reserved(name: &OsStr) -> bool {
    name == OsStr::new(TMP_DIR) || name == OsStr::new(META_DIR)
}

/// Write `data` to `path` in chunks, reporting progress after each, then fsync.
fn write_temp(path: &Path, data: &Bytes, on_progress: &ProgressCallback) -> std::io::Result<()> {
    let total = data.len() as u64;
    let mut loaded = 0u64;
    let mut file = std::fs::File::create(path)?;
    for chunk in data.chunks(WRITE_CHUNK) {
        file.write_all(chunk)?;
        loaded += chunk.len() as u64;
        on_progress(loaded, total);
    }
    file.sync_all()
}

impl RemoteObjectStore for LocalStore {
    fn list(&self, prefix: &str) -> StoreFuture<'_, Vec<RawObjectMeta>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut keys = self
                .collect_keys()
                .map_err(|e| TransportError::new("list", e))?;
            keys.retain(|k| k.starts_with(&prefix));
            keys.sort();

            let mut listed = Vec::with_capacity(keys.len());
            for key in keys {
                let path = self.root.join(&key);
                let meta = std::fs::metadata(&path).ok();
                listed.push(RawObjectMeta {
                    size: meta.as_ref().map(|m| m.len()),
                    last_modified: meta
                        .as_ref()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from),
                    content_type: self.read_content_type(&key),
                    key,
                });
            }
            tracing::debug!("local list: prefix='{}' count={}", prefix, listed.len());
            Ok(listed)
        })
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: ProgressCallback,
    ) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            self.write_object(&key, &data, &content_type, &on_progress)?;
            tracing::debug!("local put: key={} bytes={}", key, data.len());
            Ok(())
        })
    }

    fn get_url(&self, key: &str, download: bool) -> StoreFuture<'_, String> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self
                .resolve(&key)
                .map_err(|e| TransportError::new("get", e))?;
            if !path.is_file() {
                return Err(TransportError::not_found("get", &key));
            }
            let mut url = format!(
                "file://{}",
                utf8_percent_encode(&path.to_string_lossy(), PATH_SET)
            );
            if download {
                url.push_str("?download=1");
            }
            Ok(url)
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self
                .resolve(&key)
                .map_err(|e| TransportError::new("remove", e))?;
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(TransportError::new("remove", e)),
            }
            let _ = std::fs::remove_file(self.sidecar_path(&key));
            tracing::debug!("local remove: key={}", key);
            Ok(())
        })
    }
}
