use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::task::{Task, TaskRepository};

/// Volatile task store. Contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<BTreeMap<String, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.name.contains(fragment))
            .cloned()
            .collect())
    }

    async fn save(&self, task: Task) -> Result<Task> {
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.tasks.read().await.contains_key(id))
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.tasks.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_find() {
        let repo = InMemoryTaskRepository::new();
        let task = Task::new("1", "echo", "echo hello");

        let saved = repo.save(task.clone()).await.unwrap();
        assert_eq!(saved, task);
        assert_eq!(repo.find_by_id("1").await.unwrap(), Some(task));
    }

    #[tokio::test]
    async fn test_find_by_id_is_repeatable() {
        let repo = InMemoryTaskRepository::new();
        repo.save(Task::new("1", "echo", "echo hello")).await.unwrap();

        let first = repo.find_by_id("1").await.unwrap();
        let second = repo.find_by_id("1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let repo = InMemoryTaskRepository::new();
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
        assert!(!repo.exists_by_id("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_name_containing() {
        let repo = InMemoryTaskRepository::new();
        repo.save(Task::new("1", "echo", "echo hello")).await.unwrap();
        repo.save(Task::new("2", "list files", "ls")).await.unwrap();
        repo.save(Task::new("3", "echo twice", "echo a; echo b"))
            .await
            .unwrap();

        let found = repo.find_by_name_containing("ech").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);

        assert!(repo.find_by_name_containing("ECH").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_document() {
        let repo = InMemoryTaskRepository::new();
        repo.save(Task::new("1", "echo", "echo hello")).await.unwrap();
        repo.save(Task::new("1", "renamed", "true")).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "renamed");
        assert_eq!(all[0].command, "true");
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryTaskRepository::new();
        repo.save(Task::new("1", "echo", "echo hello")).await.unwrap();
        assert!(repo.exists_by_id("1").await.unwrap());

        repo.delete_by_id("1").await.unwrap();
        assert!(!repo.exists_by_id("1").await.unwrap());

        // Deleting again is a no-op
        repo.delete_by_id("1").await.unwrap();
    }
}
