//! Remote object store contract.
//!
//! Every store must implement [`RemoteObjectStore`].  Each operation is
//! asynchronous and independently fallible with a
//! [`TransportError`](crate::errors::TransportError).  Keys are opaque,
//! `/`-separated strings; the first segment is the owner namespace.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::TransportError;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Upload progress callback: `(loaded_bytes, total_bytes)`.
///
/// Stores may invoke it zero or more times before `put` completes.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Metadata of one listed object.  Every field except the key is optional;
/// the controller supplies defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObjectMeta {
    pub key: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl RawObjectMeta {
    /// Metadata carrying only a key.
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            content_type: None,
            last_modified: None,
        }
    }
}

/// Async remote object store.
pub trait RemoteObjectStore: Send + Sync + 'static {
    /// List every object whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> StoreFuture<'_, Vec<RawObjectMeta>>;

    /// Write `data` to `key` with the given content type.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: ProgressCallback,
    ) -> StoreFuture<'_, ()>;

    /// Obtain a time-limited access reference for `key`.  With
    /// `download` set the reference asks the client to save the object
    /// rather than display it.
    fn get_url(&self, key: &str, download: bool) -> StoreFuture<'_, String>;

    /// Delete the object at `key`.
    fn remove(&self, key: &str) -> StoreFuture<'_, ()>;
}
