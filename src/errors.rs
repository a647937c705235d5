//! Error types for remote store and todo store failures.
//!
//! Every remote-call failure is a [`TransportError`], whatever the
//! underlying cause (network, authorization, not-found, quota).  The
//! controllers catch these at their boundary and turn them into
//! [`Diagnostic`]s; nothing here is meant to reach the presentation layer
//! as a panic or a propagated error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// The single failure kind of the remote object store contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct TransportError {
    /// Store operation that failed (`list`, `put`, `get`, `remove`).
    pub operation: &'static str,
    /// Human-readable cause.
    pub message: String,
}

impl TransportError {
    /// Build a transport error for `operation` from any displayable cause.
    pub fn new(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self {
            operation,
            message: cause.to_string(),
        }
    }

    /// The object at `key` does not exist.
    pub fn not_found(operation: &'static str, key: &str) -> Self {
        Self::new(operation, format!("no such key: {key}"))
    }
}

/// Todo store errors.
#[derive(Debug, Error)]
pub enum TodoError {
    /// The todo does not exist or is not owned by the caller.
    #[error("todo not found: {id}")]
    NotFound { id: String },

    /// Underlying SQLite failure.
    #[error("todo store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("corrupt todo row: {0}")]
    Corrupt(String),
}

/// A logged, non-fatal error report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Diagnostic {
    /// Controller operation that failed (`refresh`, `upload`, ...).
    pub operation: &'static str,
    /// Key or id the operation targeted, if any.
    pub key: Option<String>,
    /// Failure description.
    pub message: String,
    /// When the failure was observed.
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(operation: &'static str, key: Option<&str>, err: impl std::fmt::Display) -> Self {
        Self {
            operation,
            key: key.map(str::to_string),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}
