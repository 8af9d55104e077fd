use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::task::{Task, TaskRepository};

/// Task store backed by a directory of JSON documents.
///
/// Layout:
///   {base_path}/{encoded id}.json   (one task per file)
///
/// Ids are percent-encoded into file names so any string is a valid id.
/// A save writes a sibling temp file and renames it over the document,
/// so readers never observe a half-written task.
pub struct FileTaskRepository {
    base_path: PathBuf,
}

const EXTENSION: &str = "json";

impl FileTaskRepository {
    pub async fn open(path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("creating task directory {}", path.display()))?;
        info!("Task store opened at {}", path.display());
        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    fn document_path(&self, id: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        self.base_path.join(format!("{encoded}.{EXTENSION}"))
    }

    async fn read_document(path: &Path) -> Result<Task> {
        let content = tokio::fs::read_to_string(path).await?;
        let task = serde_json::from_str(&content)
            .with_context(|| format!("parsing task document {}", path.display()))?;
        Ok(task)
    }
}

#[async_trait]
impl TaskRepository for FileTaskRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        let path = self.document_path(id);
        match Self::read_document(&path).await {
            Ok(task) => Ok(Some(task)),
            Err(e) => match e.downcast_ref::<std::io::Error>() {
                Some(io) if io.kind() == std::io::ErrorKind::NotFound => Ok(None),
                _ => Err(e),
            },
        }
    }

    async fn find_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match Self::read_document(&path).await {
                Ok(task) => tasks.push(task),
                // A document deleted between read_dir and read is simply gone
                Err(e) => warn!("Skipping unreadable task document: {e:#}"),
            }
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|task| task.name.contains(fragment))
            .collect())
    }

    async fn save(&self, task: Task) -> Result<Task> {
        let path = self.document_path(&task.id);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp-{}", uuid::Uuid::new_v4().simple()));
        let body = serde_json::to_vec_pretty(&task)?;

        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("replacing {}", path.display()));
        }
        Ok(task)
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.document_path(id)).await?)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.document_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
