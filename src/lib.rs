//! filedash library: client-side core of a personal file and todo
//! dashboard.
//!
//! This crate keeps a local catalog of a user's remote files in step with
//! an object store (memory, local disk, or S3), tracks upload progress, and
//! manages an owner-scoped todo list.  The CLI in `main.rs` is one
//! presentation layer over it.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod sync;
pub mod todos;
pub mod upload;

pub use catalog::{LocalCatalog, ObjectRecord};
pub use errors::{Diagnostic, TransportError};
pub use storage::backend::RemoteObjectStore;
pub use sync::FileSyncController;
pub use todos::board::TodoBoard;
pub use upload::{UploadFile, UploadStatus};
