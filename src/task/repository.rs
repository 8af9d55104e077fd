//! `TaskRepository` trait: abstraction over task storage.
//!
//! Backends (in-memory, JSON files, ...) implement this trait so the
//! service can be configured with any of them via the `[storage]`
//! config table.

use anyhow::Result;
use async_trait::async_trait;

use super::model::Task;

/// Key-value store of task documents.
///
/// Writes are whole-document replaces. The trait provides no
/// compare-and-swap; callers that read-modify-write must serialize
/// themselves (see `service::TaskLocks`).
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Returns the task with this id, or `None`.
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>>;

    /// Returns every stored task, ordered by id.
    async fn find_all(&self) -> Result<Vec<Task>>;

    /// Returns tasks whose name contains `fragment` (case-sensitive),
    /// ordered by id.
    async fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>>;

    /// Inserts or replaces the task keyed by `task.id`.
    async fn save(&self, task: Task) -> Result<Task>;

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Removes the task. Deleting an absent id is not an error.
    async fn delete_by_id(&self, id: &str) -> Result<()>;
}
