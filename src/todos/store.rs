//! Abstract todo store trait.
//!
//! Todos are owner-scoped: a store must behave as if records owned by
//! anyone else do not exist.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::errors::TodoError;

/// Boxed future returned by every todo store operation.
pub type TodoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TodoError>> + Send + 'a>>;

/// One todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoRecord {
    pub id: Uuid,
    pub owner: String,
    /// Free text; may be absent for records created by other clients.
    pub content: Option<String>,
    pub is_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Async todo persistence contract.
pub trait TodoStore: Send + Sync + 'static {
    /// All of `owner`'s todos, oldest first.
    fn list(&self, owner: &str) -> TodoFuture<'_, Vec<TodoRecord>>;

    /// Create a todo with `content` for `owner`.
    fn create(&self, owner: &str, content: &str) -> TodoFuture<'_, TodoRecord>;

    /// Delete `owner`'s todo `id`.
    fn delete(&self, owner: &str, id: Uuid) -> TodoFuture<'_, ()>;

    /// Mark `owner`'s todo `id` done or not done, returning the updated
    /// record.
    fn set_done(&self, owner: &str, id: Uuid, done: bool) -> TodoFuture<'_, TodoRecord>;
}
