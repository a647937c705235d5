//! SQLite-backed todo store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{TodoFuture, TodoRecord, TodoStore};
use crate::errors::TodoError;

/// Todo store backed by a single SQLite database file.
pub struct SqliteTodoStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteTodoStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Create the todo table if it does not already exist.  Idempotent.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS todos (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL UNIQUE,
                owner      TEXT NOT NULL,
                content    TEXT,
                is_done    INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_todos_owner ON todos(owner);
            ",
        )?;
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RawTodo> {
        Ok(RawTodo {
            id: row.get(0)?,
            owner: row.get(1)?,
            content: row.get(2)?,
            is_done: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn fetch(conn: &Connection, owner: &str, id: Uuid) -> Result<TodoRecord, TodoError> {
        conn.query_row(
            "SELECT id, owner, content, is_done, created_at, updated_at
               FROM todos WHERE owner = ?1 AND id = ?2",
            params![owner, id.to_string()],
            Self::row_to_record,
        )
        .optional()?
        .ok_or_else(|| TodoError::NotFound { id: id.to_string() })?
        .decode()
    }
}

/// A row as stored, before decoding ids and timestamps.
struct RawTodo {
    id: String,
    owner: String,
    content: Option<String>,
    is_done: bool,
    created_at: String,
    updated_at: String,
}

impl RawTodo {
    fn decode(self) -> Result<TodoRecord, TodoError> {
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| TodoError::Corrupt(format!("bad timestamp '{s}': {e}")))
        };
        Ok(TodoRecord {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| TodoError::Corrupt(format!("bad id '{}': {e}", self.id)))?,
            owner: self.owner,
            content: self.content,
            is_done: self.is_done,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

impl TodoStore for SqliteTodoStore {
    fn list(&self, owner: &str) -> TodoFuture<'_, Vec<TodoRecord>> {
        let owner = owner.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, owner, content, is_done, created_at, updated_at
                   FROM todos WHERE owner = ?1 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![owner], Self::row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(RawTodo::decode).collect()
        })
    }

    fn create(&self, owner: &str, content: &str) -> TodoFuture<'_, TodoRecord> {
        let owner = owner.to_string();
        let content = content.to_string();
        Box::pin(async move {
            let id = Uuid::new_v4();
            let now = Utc::now().to_rfc3339();
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO todos (id, owner, content, is_done, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![id.to_string(), owner, content, now],
            )?;
            Self::fetch(&conn, &owner, id)
        })
    }

    fn delete(&self, owner: &str, id: Uuid) -> TodoFuture<'_, ()> {
        let owner = owner.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let deleted = conn.execute(
                "DELETE FROM todos WHERE owner = ?1 AND id = ?2",
                params![owner, id.to_string()],
            )?;
            if deleted == 0 {
                return Err(TodoError::NotFound { id: id.to_string() });
            }
            Ok(())
        })
    }

    fn set_done(&self, owner: &str, id: Uuid, done: bool) -> TodoFuture<'_, TodoRecord> {
        let owner = owner.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let updated = conn.execute(
                "UPDATE todos SET is_done = ?1, updated_at = ?2 WHERE owner = ?3 AND id = ?4",
                params![done, Utc::now().to_rfc3339(), owner, id.to_string()],
            )?;
            if updated == 0 {
                return Err(TodoError::NotFound { id: id.to_string() });
            }
            Self::fetch(&conn, &owner, id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteTodoStore {
        SqliteTodoStore::new(":memory:").expect("failed to create in-memory store")
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let store = test_store();
        store.init_db().expect("second init_db failed");
    }

    #[tokio::test]
    async fn test_create_and_list_in_creation_order() {
        let store = test_store();
        let first = store.create("u1", "buy milk").await.unwrap();
        let second = store.create("u1", "write report").await.unwrap();

        assert_eq!(first.content.as_deref(), Some("buy milk"));
        assert!(!first.is_done);
        assert_eq!(first.created_at, first.updated_at);

        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let store = test_store();
        store.create("u1", "mine").await.unwrap();
        store.create("u2", "theirs").await.unwrap();

        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].owner, "u1");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = test_store();
        let todo = store.create("u1", "x").await.unwrap();
        store.delete("u1", todo.id).await.unwrap();
        assert!(store.list("u1").await.unwrap().is_empty());

        let err = store.delete("u1", todo.id).await.unwrap_err();
        assert!(matches!(err, TodoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_other_owners_todo_is_not_found() {
        let store = test_store();
        let todo = store.create("u2", "theirs").await.unwrap();

        let err = store.delete("u1", todo.id).await.unwrap_err();
        assert!(matches!(err, TodoError::NotFound { .. }));
        assert_eq!(store.list("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_done() {
        let store = test_store();
        let todo = store.create("u1", "x").await.unwrap();

        let done = store.set_done("u1", todo.id, true).await.unwrap();
        assert!(done.is_done);
        assert!(done.updated_at >= todo.updated_at);

        let undone = store.set_done("u1", todo.id, false).await.unwrap();
        assert!(!undone.is_done);

        assert!(store.set_done("u2", todo.id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.db");
        let path = path.to_str().unwrap();

        let id = {
            let store = SqliteTodoStore::new(path).unwrap();
            store.create("u1", "survives").await.unwrap().id
        };

        let store = SqliteTodoStore::new(path).unwrap();
        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }
}
