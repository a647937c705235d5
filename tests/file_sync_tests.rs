//! End-to-end tests of the file sync controller over the shipped stores.

use std::sync::Arc;

use filedash::storage::backend::RemoteObjectStore;
use filedash::storage::local::LocalStore;
use filedash::storage::memory::MemoryStore;
use filedash::upload::{FixedClock, UploadStatus};
use filedash::{FileSyncController, UploadFile};

const T: u64 = 1_700_000_000_000;

fn controller_over(store: Arc<dyn RemoteObjectStore>, owner: &str) -> FileSyncController {
    FileSyncController::new(store, owner).with_clock(Arc::new(FixedClock(T)))
}

#[tokio::test]
async fn test_upload_list_remove_over_memory_store() {
    let store = Arc::new(MemoryStore::with_chunk_size(3));
    let controller = controller_over(store.clone(), "u1");
    assert_eq!(controller.refresh().await, Some(0));

    let record = controller
        .upload(UploadFile::new("report.pdf", vec![9u8; 10], "application/pdf"))
        .await
        .expect("upload should succeed");
    assert_eq!(record.key, format!("u1/{T}-report.pdf"));
    assert_eq!(store.read(&record.key).await.unwrap().len(), 10);
    assert_eq!(controller.upload_status(), UploadStatus::IDLE);

    // The optimistic record matches what a fresh listing reports.
    let optimistic = controller.catalog();
    controller.refresh().await.unwrap();
    let listed = controller.catalog();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, optimistic[0].key);
    assert_eq!(listed[0].size_bytes, optimistic[0].size_bytes);
    assert_eq!(listed[0].content_type, "application/pdf");

    assert!(controller.remove(&record.key).await);
    assert!(controller.catalog().is_empty());
    controller.refresh().await.unwrap();
    assert!(controller.catalog().is_empty());
}

#[tokio::test]
async fn test_owners_do_not_see_each_other() {
    let store: Arc<dyn RemoteObjectStore> = Arc::new(MemoryStore::new());
    let alice = controller_over(store.clone(), "alice");
    let bob = controller_over(store.clone(), "bob");

    alice
        .upload(UploadFile::new("a.txt", "hi", "text/plain"))
        .await
        .unwrap();
    bob.upload(UploadFile::new("b.txt", "yo", "text/plain"))
        .await
        .unwrap();

    alice.refresh().await.unwrap();
    bob.refresh().await.unwrap();
    assert_eq!(alice.catalog().len(), 1);
    assert!(alice.catalog()[0].key.starts_with("alice/"));
    assert_eq!(bob.catalog().len(), 1);
    assert!(bob.catalog()[0].key.starts_with("bob/"));
}

#[tokio::test]
async fn test_local_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dir.path()).unwrap());
    let controller = controller_over(store, "u1");
    controller.refresh().await.unwrap();

    let first = controller
        .upload(UploadFile::new("notes.txt", "one", "text/plain"))
        .await
        .unwrap();
    let second = controller
        .upload(UploadFile::new("notes.txt", "two", "text/plain"))
        .await
        .unwrap();
    assert_ne!(first.key, second.key);

    let url = controller.resolve_access_url(&first.key).await.unwrap();
    assert!(url.starts_with("file://"));

    // A second view over the same directory sees both files.
    let store = Arc::new(LocalStore::new(dir.path()).unwrap());
    let other_view = controller_over(store, "u1");
    assert_eq!(other_view.refresh().await, Some(2));
    let names: Vec<_> = other_view
        .catalog()
        .into_iter()
        .map(|r| r.display_name)
        .collect();
    assert_eq!(names, vec![format!("{T}-notes.txt"), format!("{}-notes.txt", T + 1)]);

    assert!(controller.remove(&first.key).await);
    assert_eq!(other_view.refresh().await, Some(1));
}

#[tokio::test]
async fn test_resolve_missing_key_is_diagnosed() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller_over(store, "u1");

    assert!(controller.resolve_access_url("u1/missing").await.is_none());
    let diag = controller.last_diagnostic().unwrap();
    assert_eq!(diag.key.as_deref(), Some("u1/missing"));
    assert!(controller.catalog().is_empty());
}

#[tokio::test]
async fn test_owner_with_trailing_slash_fails_on_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dir.path()).unwrap());
    let controller = controller_over(store.clone(), "alice/");

    let uploaded = controller
        .upload(UploadFile::new("a.txt", "hi", "text/plain"))
        .await;
    assert!(uploaded.is_none());
    assert!(controller.catalog().is_empty());
    assert_eq!(controller.last_diagnostic().unwrap().operation, "upload");
    assert!(store.list("").await.unwrap().is_empty());
}
