//! Todo board controller.
//!
//! Same contract as the file sync controller: one store call per intent,
//! local list patched only after the call succeeds, failures logged and
//! swallowed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::store::{TodoRecord, TodoStore};
use crate::errors::{Diagnostic, TodoError};
use crate::metrics;

const DIAGNOSTICS_CAPACITY: usize = 32;

/// An owner's todo list and the intents that change it.
pub struct TodoBoard {
    store: Arc<dyn TodoStore>,
    owner: String,
    todos: watch::Sender<Vec<TodoRecord>>,
    diagnostics: Mutex<VecDeque<Diagnostic>>,
}

impl TodoBoard {
    pub fn new(store: Arc<dyn TodoStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            todos: watch::channel(Vec::new()).0,
            diagnostics: Mutex::new(VecDeque::new()),
        }
    }

    /// Reload the owner's todos.  Returns the count, or `None` on failure.
    pub async fn refresh(&self) -> Option<usize> {
        match self.store.list(&self.owner).await {
            Ok(todos) => {
                metrics::record_todo_operation("refresh", true);
                let count = todos.len();
                self.todos.send_replace(todos);
                Some(count)
            }
            Err(err) => {
                self.diagnose("refresh", None, &err);
                None
            }
        }
    }

    /// Create a todo.  Blank content is ignored without calling the store
    /// and without recording a diagnostic.
    pub async fn create(&self, content: &str) -> Option<TodoRecord> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        match self.store.create(&self.owner, content).await {
            Ok(todo) => {
                metrics::record_todo_operation("create", true);
                info!("todo created: {}", todo.id);
                self.todos.send_if_modified(|todos| {
                    if todos.iter().any(|t| t.id == todo.id) {
                        return false;
                    }
                    todos.push(todo.clone());
                    true
                });
                Some(todo)
            }
            Err(err) => {
                self.diagnose("create", None, &err);
                None
            }
        }
    }

    /// Delete a todo; the local list drops it only after the store confirms.
    pub async fn delete(&self, id: Uuid) -> bool {
        match self.store.delete(&self.owner, id).await {
            Ok(()) => {
                metrics::record_todo_operation("delete", true);
                info!("todo deleted: {}", id);
                self.todos.send_if_modified(|todos| {
                    let before = todos.len();
                    todos.retain(|t| t.id != id);
                    todos.len() != before
                });
                true
            }
            Err(err) => {
                self.diagnose("delete", Some(id), &err);
                false
            }
        }
    }

    /// Flip a todo's done flag.  Uses the locally known state to decide the
    /// new value; an unknown id is treated as not done.
    pub async fn toggle_done(&self, id: Uuid) -> Option<TodoRecord> {
        let currently_done = self
            .todos
            .borrow()
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.is_done)
            .unwrap_or(false);

        match self.store.set_done(&self.owner, id, !currently_done).await {
            Ok(updated) => {
                metrics::record_todo_operation("toggle_done", true);
                self.todos.send_if_modified(|todos| {
                    match todos.iter_mut().find(|t| t.id == id) {
                        Some(slot) => {
                            *slot = updated.clone();
                            true
                        }
                        None => false,
                    }
                });
                Some(updated)
            }
            Err(err) => {
                self.diagnose("toggle_done", Some(id), &err);
                None
            }
        }
    }

    /// Snapshot of the owner's todos.
    pub fn todos(&self) -> Vec<TodoRecord> {
        self.todos.borrow().clone()
    }

    /// Receiver notified whenever the list changes.
    pub fn watch_todos(&self) -> watch::Receiver<Vec<TodoRecord>> {
        self.todos.subscribe()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .expect("mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn diagnose(&self, operation: &'static str, id: Option<Uuid>, err: &TodoError) {
        metrics::record_todo_operation(operation, false);
        let id = id.map(|id| id.to_string());
        warn!(
            operation,
            id = id.as_deref().unwrap_or(""),
            error = %err,
            "todo operation failed"
        );
        let mut diagnostics = self.diagnostics.lock().expect("mutex poisoned");
        if diagnostics.len() >= DIAGNOSTICS_CAPACITY {
            diagnostics.pop_front();
        }
        diagnostics.push_back(Diagnostic::new(operation, id.as_deref(), err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todos::sqlite::SqliteTodoStore;

    fn board(owner: &str) -> (Arc<SqliteTodoStore>, TodoBoard) {
        let store = Arc::new(SqliteTodoStore::new(":memory:").unwrap());
        let board = TodoBoard::new(store.clone(), owner);
        (store, board)
    }

    #[tokio::test]
    async fn test_create_appends() {
        let (_store, board) = board("u1");
        let todo = board.create("  buy milk ").await.unwrap();

        assert_eq!(todo.content.as_deref(), Some("buy milk"));
        assert_eq!(board.todos(), vec![todo]);
    }

    #[tokio::test]
    async fn test_blank_content_creates_nothing() {
        let (store, board) = board("u1");
        assert!(board.create("   ").await.is_none());
        assert!(board.todos().is_empty());
        assert!(store.list("u1").await.unwrap().is_empty());
        assert!(board.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_loads_existing() {
        let (store, board) = board("u1");
        store.create("u1", "a").await.unwrap();
        store.create("u1", "b").await.unwrap();
        store.create("u2", "not mine").await.unwrap();

        assert_eq!(board.refresh().await, Some(2));
        let contents: Vec<_> = board
            .todos()
            .into_iter()
            .filter_map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_filters_locally_on_success() {
        let (_store, board) = board("u1");
        let a = board.create("a").await.unwrap();
        let b = board.create("b").await.unwrap();

        assert!(board.delete(a.id).await);
        assert_eq!(board.todos(), vec![b]);
    }

    #[tokio::test]
    async fn test_delete_of_foreign_todo_fails_and_keeps_board() {
        let (store, board) = board("u1");
        board.create("mine").await.unwrap();
        let foreign = store.create("u2", "theirs").await.unwrap();
        let before = board.todos();

        assert!(!board.delete(foreign.id).await);
        assert_eq!(board.todos(), before);
        assert_eq!(board.diagnostics()[0].operation, "delete");
    }

    #[tokio::test]
    async fn test_toggle_done_round_trip() {
        let (_store, board) = board("u1");
        let todo = board.create("x").await.unwrap();

        assert!(board.toggle_done(todo.id).await.unwrap().is_done);
        assert!(board.todos()[0].is_done);
        assert!(!board.toggle_done(todo.id).await.unwrap().is_done);
        assert!(!board.todos()[0].is_done);
    }

    #[tokio::test]
    async fn test_watchers_see_every_change() {
        let (_store, board) = board("u1");
        let mut rx = board.watch_todos();
        assert!(rx.borrow_and_update().is_empty());

        let todo = board.create("watch me").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![todo.clone()]);

        board.toggle_done(todo.id).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update()[0].is_done);

        board.delete(todo.id).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn test_failed_intent_does_not_notify() {
        let (_store, board) = board("u1");
        let rx = board.watch_todos();

        assert!(board.create("   ").await.is_none());
        assert!(board.toggle_done(Uuid::new_v4()).await.is_none());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_toggle_unknown_id_is_diagnosed() {
        let (_store, board) = board("u1");
        assert!(board.toggle_done(Uuid::new_v4()).await.is_none());
        assert_eq!(board.diagnostics().len(), 1);
    }
}
