//! In-memory object store.
//!
//! Objects live in a `tokio::sync::RwLock<BTreeMap<...>>`, so listing is
//! always in key order.  Uploads report progress in fixed-size chunks to
//! mimic a streaming transport.  Useful for tests and for running the
//! dashboard without any backend.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::backend::{ProgressCallback, RawObjectMeta, RemoteObjectStore, StoreFuture};
use crate::errors::TransportError;

/// Progress granularity for simulated transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// Object store held entirely in process memory.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a store that reports progress every `chunk_size` bytes.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Read back the bytes stored at `key`.
    pub async fn read(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl RemoteObjectStore for MemoryStore {
    fn list(&self, prefix: &str) -> StoreFuture<'_, Vec<RawObjectMeta>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            let listed = objects
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, obj)| RawObjectMeta {
                    key: key.clone(),
                    size: Some(obj.data.len() as u64),
                    content_type: Some(obj.content_type.clone()),
                    last_modified: Some(obj.last_modified),
                })
                .collect::<Vec<_>>();
            tracing::debug!("memory list: prefix='{}' count={}", prefix, listed.len());
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
            let total = data.len() as u64;
            let mut loaded = 0u64;
            for chunk in data.chunks(self.chunk_size) {
                loaded += chunk.len() as u64;
                on_progress(loaded, total);
                tokio::task::yield_now().await;
            }

            tracing::debug!("memory put: key={} bytes={}", key, total);
            self.objects.write().await.insert(
                key,
                StoredObject {
                    data,
                    content_type,
                    last_modified: Utc::now(),
                },
            );
            Ok(())
        })
    }

    fn get_url(&self, key: &str, download: bool) -> StoreFuture<'_, String> {
        let key = key.to_string();
        Box::pin(async move {
            if !self.objects.read().await.contains_key(&key) {
                return Err(TransportError::not_found("get", &key));
            }
            let mut url = format!("memory://{key}");
            if download {
                url.push_str("?download=1");
            }
            Ok(url)
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            // Idempotent, like S3 DeleteObject.
            self.objects.write().await.remove(&key);
            tracing::debug!("memory remove: key={}", key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn no_progress() -> ProgressCallback {
        Arc::new(|_: u64, _: u64| {})
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let store = MemoryStore::new();
        store
            .put("u1/a.txt", Bytes::from("hello"), "text/plain", no_progress())
            .await
            .unwrap();

        let listed = store.list("u1/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "u1/a.txt");
        assert_eq!(listed[0].size, Some(5));
        assert_eq!(listed[0].content_type.as_deref(), Some("text/plain"));
        assert!(listed[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_list_scopes_by_prefix() {
        let store = MemoryStore::new();
        for key in ["u1/a", "u1/b", "u2/a", "u10/a"] {
            store
                .put(key, Bytes::from("x"), "text/plain", no_progress())
                .await
                .unwrap();
        }

        let keys: Vec<_> = store
            .list("u1/")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["u1/a", "u1/b"]);

        assert_eq!(store.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_put_reports_chunked_progress() {
        let store = MemoryStore::with_chunk_size(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store
            .put(
                "u1/ten.bin",
                Bytes::from(vec![0u8; 10]),
                "application/octet-stream",
                Arc::new(move |loaded: u64, total: u64| sink.lock().unwrap().push((loaded, total))),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn test_put_empty_reports_nothing() {
        let store = MemoryStore::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        store
            .put(
                "u1/empty",
                Bytes::new(),
                "text/plain",
                Arc::new(move |_: u64, _: u64| *sink.lock().unwrap() += 1),
            )
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(store.read("u1/empty").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_url() {
        let store = MemoryStore::new();
        store
            .put("u1/a.txt", Bytes::from("x"), "text/plain", no_progress())
            .await
            .unwrap();

        assert_eq!(store.get_url("u1/a.txt", false).await.unwrap(), "memory://u1/a.txt");
        assert_eq!(
            store.get_url("u1/a.txt", true).await.unwrap(),
            "memory://u1/a.txt?download=1"
        );
    }

    #[tokio::test]
    async fn test_get_url_missing_is_error() {
        let store = MemoryStore::new();
        let err = store.get_url("u1/nope", false).await.unwrap_err();
        assert_eq!(err.operation, "get");
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_ok() {
        let store = MemoryStore::new();
        store.remove("u1/no-such-key").await.unwrap();
        assert!(store.is_empty().await);
    }
}
