use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A named shell command plus the history of its runs.
///
/// Serialized with camelCase keys (`taskExecutions`, `startTime`, ...)
/// so stored documents and HTTP bodies share one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Empty when the client did not supply one; the service assigns it.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub command: String,
    /// Chronological: the last element is the most recent run.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub task_executions: Vec<TaskExecution>,
}

/// One run of a task's command. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    /// Captured stdout+stderr, or a diagnostic when the run never completed.
    pub output: String,
}

/// How a run ended, so callers need not parse `output` to tell
/// a failing command from a failing infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The unit ran the command and it exited zero.
    Succeeded,
    /// The unit ran the command and it exited non-zero.
    Failed,
    /// The unit did not reach a terminal phase in time.
    TimedOut,
    /// The unit could not be created, observed or read.
    Error,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<TaskExecution>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<TaskExecution>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Task {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            task_executions: Vec::new(),
        }
    }

    pub fn record_execution(&mut self, execution: TaskExecution) {
        self.task_executions.push(execution);
    }

    #[cfg(test)]
    pub fn last_execution(&self) -> Option<&TaskExecution> {
        self.task_executions.last()
    }
}
