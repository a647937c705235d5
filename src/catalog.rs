//! Local catalog of known remote objects.
//!
//! The catalog is a cache, not a source of truth: the remote store is
//! authoritative and the catalog may diverge from it between an optimistic
//! local patch and the next full refresh.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::backend::RawObjectMeta;

/// Content type recorded when the store did not report one.
pub const UNKNOWN_CONTENT_TYPE: &str = "unknown";

/// One known remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    pub key: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(
        key: impl Into<String>,
        size_bytes: u64,
        content_type: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let key = key.into();
        Self {
            display_name: display_name(&key).to_string(),
            key,
            size_bytes,
            content_type: content_type.into(),
            last_modified,
        }
    }

    /// Map listed metadata to a record, filling absent fields with
    /// defaults (size 0, content type `unknown`, last modified `now`).
    pub fn from_raw(raw: RawObjectMeta, now: DateTime<Utc>) -> Self {
        Self::new(
            raw.key,
            raw.size.unwrap_or(0),
            raw.content_type
                .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string()),
            raw.last_modified.unwrap_or(now),
        )
    }
}

/// Last path segment of `key`, ignoring a trailing slash.
pub fn display_name(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Ordered sequence of records with unique keys, in discovery/creation
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCatalog {
    records: Vec<ObjectRecord>,
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole catalog.  Later duplicates of a key are dropped so
    /// the uniqueness invariant holds even for a misbehaving store.
    pub fn replace(&mut self, records: impl IntoIterator<Item = ObjectRecord>) {
        self.records.clear();
        for record in records {
            if !self.contains(&record.key) {
                self.records.push(record);
            }
        }
    }

    /// Append `record`, or replace the record with the same key in place.
    pub fn upsert(&mut self, record: ObjectRecord) {
        match self.records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Remove the record with `key`, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<ObjectRecord> {
        let index = self.records.iter().position(|r| r.key == key)?;
        Some(self.records.remove(index))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.iter().any(|r| r.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&ObjectRecord> {
        self.records.iter().find(|r| r.key == key)
    }

    pub fn records(&self) -> &[ObjectRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total bytes across all records.
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size_bytes).sum()
    }
}
