//! Remote object stores.
//!
//! The [`backend::RemoteObjectStore`] trait abstracts over where the
//! dashboard's files live.  Implementations include process memory, the
//! local disk, and an S3 bucket.

use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;
use backend::RemoteObjectStore;

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

/// Build the store selected by `config.backend`.
pub async fn build_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn RemoteObjectStore>> {
    let store: Arc<dyn RemoteObjectStore> = match config.backend.as_str() {
        "memory" => {
            info!("Memory object store initialized");
            Arc::new(memory::MemoryStore::new())
        }
        "local" => {
            let root = &config.local.root_dir;
            let store = local::LocalStore::new(root)?;
            info!("Local object store initialized at {}", root);
            Arc::new(store)
        }
        "s3" => {
            let s3_config = config.s3.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 's3' but storage.s3 config section is missing")
            })?;
            Arc::new(aws::S3Store::new(s3_config).await?)
        }
        other => anyhow::bail!("unknown storage backend '{other}' (expected memory, local, s3)"),
    };
    Ok(store)
}
