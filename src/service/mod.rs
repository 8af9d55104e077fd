//! Task service: the orchestrator between storage and execution.
//!
//! The HTTP layer calls into `TaskService` only. Every mutation of a
//! task document (save, delete, execute) runs under that task's lock
//! from `TaskLocks`, so an execution's appended record can never be
//! lost to a concurrent write of the same task.

pub mod locks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::executor::{ExecutionOutcome, Provisioner, UnitPhase};
use crate::task::{ExecutionStatus, Task, TaskExecution, TaskRepository};

pub use locks::TaskLocks;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Task with ID {0} not found.")]
    NotFound(String),
    #[error("Invalid task: {0}")]
    Invalid(String),
    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
    provisioner: Provisioner,
    locks: TaskLocks,
}

impl TaskService {
    pub fn new(repository: Arc<dyn TaskRepository>, provisioner: Provisioner) -> Self {
        Self {
            repository,
            provisioner,
            locks: TaskLocks::new(),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.repository.find_all().await?)
    }

    /// Tasks whose name contains `fragment`. May be empty.
    pub async fn find_by_name(&self, fragment: &str) -> Result<Vec<Task>> {
        Ok(self.repository.find_by_name_containing(fragment).await?)
    }

    /// Creates or replaces a task. A task without an id gets a fresh
    /// UUID; one with an existing id replaces the stored document.
    pub async fn save(&self, mut task: Task) -> Result<Task> {
        if task.name.trim().is_empty() {
            return Err(ServiceError::Invalid("name must not be empty".to_string()));
        }
        if task.command.trim().is_empty() {
            return Err(ServiceError::Invalid("command must not be empty".to_string()));
        }
        if task.id.trim().is_empty() {
            task.id = uuid::Uuid::new_v4().to_string();
        }

        let _guard = self.locks.acquire(&task.id).await;
        let saved = self.repository.save(task).await?;
        info!("Saved task {} ({})", saved.id, saved.name);
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        if !self.repository.exists_by_id(id).await? {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        self.repository.delete_by_id(id).await?;
        info!("Deleted task {id}");
        Ok(())
    }

    /// Runs the task's command once and appends the resulting record.
    ///
    /// Infrastructure failures do not make this fail: they are recorded
    /// in the appended execution's `status` and `output`. Only a missing
    /// task or a storage error is returned as `Err`.
    pub async fn execute(&self, id: &str) -> Result<Task> {
        let _guard = self.locks.acquire(id).await;
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

        info!("Executing task {} ({}): {}", task.id, task.name, task.command);

        let start_time = Utc::now();
        let outcome = self.provisioner.run(&task.id, &task.command).await;
        let end_time = Utc::now();

        let execution = execution_record(start_time, end_time, outcome);
        info!(
            "Task {} execution {:?} in {}ms",
            task.id,
            execution.status,
            (execution.end_time - execution.start_time).num_milliseconds()
        );

        task.record_execution(execution);
        Ok(self.repository.save(task).await?)
    }
}

/// Turns a provisioning outcome into the record stored on the task.
/// Runs that never produced output carry a diagnostic instead.
fn execution_record(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    outcome: ExecutionOutcome,
) -> TaskExecution {
    let (status, output) = match outcome {
        ExecutionOutcome::Completed { output, phase } => {
            let status = if phase == UnitPhase::Succeeded {
                ExecutionStatus::Succeeded
            } else {
                ExecutionStatus::Failed
            };
            (status, output)
        }
        ExecutionOutcome::TimedOut { unit, after } => (
            ExecutionStatus::TimedOut,
            format!(
                "Execution timed out: unit {unit} did not finish within {}s",
                after.as_secs()
            ),
        ),
        ExecutionOutcome::ProvisioningError { stage, detail } => (
            ExecutionStatus::Error,
            format!("Failed to execute task: error while {stage}: {detail}"),
        ),
    };

    TaskExecution {
        start_time,
        end_time,
        status,
        output,
    }
}
