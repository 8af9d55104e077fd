pub mod file;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{StorageBackend, StorageConfig};
use crate::task::TaskRepository;

pub use file::FileTaskRepository;
pub use memory::InMemoryTaskRepository;

/// Builds the repository selected by the `[storage]` config table.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn TaskRepository>> {
    match config.backend {
        StorageBackend::File => Ok(Arc::new(FileTaskRepository::open(&config.path).await?)),
        StorageBackend::Memory => Ok(Arc::new(InMemoryTaskRepository::new())),
    }
}
