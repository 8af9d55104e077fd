use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{BackendError, ExecutionBackend, UnitPhase, UnitSpec};
use crate::backoff::Backoff;

/// Kubernetes object names are DNS-1123 labels: at most 63 chars.
const MAX_UNIT_NAME: usize = 63;
const UNIT_PREFIX: &str = "task-runner";

const POLL_INITIAL: Duration = Duration::from_millis(500);
const POLL_MAX: Duration = Duration::from_secs(5);

/// Where a failed run gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Wait,
    Logs,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Create => "creating the execution unit",
            Stage::Wait => "waiting for the execution unit",
            Stage::Logs => "reading the execution unit's output",
        };
        f.write_str(s)
    }
}

/// Result of one provisioned run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The unit reached a terminal phase and its output was read.
    /// `phase` is `Succeeded` or `Failed`.
    Completed { output: String, phase: UnitPhase },
    /// The unit was still not terminal when the timeout fired.
    TimedOut { unit: String, after: Duration },
    /// The backend failed before any output could be captured.
    ProvisioningError { stage: Stage, detail: String },
}

/// Runs commands in single-use execution units.
///
/// Each `run` creates one uniquely named unit, waits for it under a
/// wall-clock timeout, reads its output and always attempts to
/// delete it. Nothing is shared between runs.
pub struct Provisioner {
    backend: Arc<dyn ExecutionBackend>,
    image: String,
    timeout: Duration,
    poll_initial: Duration,
    poll_max: Duration,
}

impl Provisioner {
    pub fn new(backend: Arc<dyn ExecutionBackend>, image: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            image: image.into(),
            timeout,
            poll_initial: POLL_INITIAL,
            poll_max: POLL_MAX,
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_max = max;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_description(&self) -> String {
        self.backend.description()
    }

    /// Runs `command` through `sh -c` in a fresh unit. Never fails:
    /// every error is reported as an `ExecutionOutcome` variant.
    pub async fn run(&self, task_id: &str, command: &str) -> ExecutionOutcome {
        let name = unit_name(task_id);
        let spec = UnitSpec::shell(&name, &self.image, command);

        info!("Starting execution unit {name} for task {task_id}");
        // Armed before create: a failed create may still leave a
        // half-created unit behind, and a dropped run must not leak it.
        let cleanup = UnitCleanup::new(self.backend.clone(), &name);
        let outcome = self.drive(&spec).await;
        cleanup.delete().await;

        match &outcome {
            ExecutionOutcome::Completed { phase, output } => {
                info!("Execution unit {name} finished ({phase}, {} bytes of output)", output.len());
            }
            ExecutionOutcome::TimedOut { after, .. } => {
                warn!("Execution unit {name} timed out after {}s", after.as_secs());
            }
            ExecutionOutcome::ProvisioningError { stage, detail } => {
                warn!("Execution unit {name} failed while {stage}: {detail}");
            }
        }

        outcome
    }

    async fn drive(&self, spec: &UnitSpec) -> ExecutionOutcome {
        if let Err(e) = self.backend.create(spec).await {
            return ExecutionOutcome::ProvisioningError {
                stage: Stage::Create,
                detail: e.to_string(),
            };
        }

        let phase = match tokio::time::timeout(self.timeout, self.wait_terminal(&spec.name)).await {
            Ok(Ok(phase)) => phase,
            Ok(Err(e)) => {
                return ExecutionOutcome::ProvisioningError {
                    stage: Stage::Wait,
                    detail: e.to_string(),
                }
            }
            Err(_) => {
                return ExecutionOutcome::TimedOut {
                    unit: spec.name.clone(),
                    after: self.timeout,
                }
            }
        };

        match self.backend.logs(&spec.name).await {
            Ok(output) => ExecutionOutcome::Completed { output, phase },
            Err(e) => ExecutionOutcome::ProvisioningError {
                stage: Stage::Logs,
                detail: e.to_string(),
            },
        }
    }

    /// Polls until the unit is terminal. Unbounded; the caller applies
    /// the timeout.
    async fn wait_terminal(&self, name: &str) -> Result<UnitPhase, BackendError> {
        let mut backoff = Backoff::new(self.poll_initial, self.poll_max);
        loop {
            let phase = self.backend.phase(name).await?;
            if phase.is_terminal() {
                debug!("Execution unit {name} reached {phase} after {} polls", backoff.polls + 1);
                return Ok(phase);
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}

/// Deletes a unit once its run is over.
///
/// `delete` is the normal path. If the run's future is dropped first
/// (client gone, task aborted), `Drop` hands the delete to the runtime
/// instead so the unit is still removed.
struct UnitCleanup {
    backend: Arc<dyn ExecutionBackend>,
    name: Option<String>,
}

impl UnitCleanup {
    fn new(backend: Arc<dyn ExecutionBackend>, name: &str) -> Self {
        Self {
            backend,
            name: Some(name.to_string()),
        }
    }

    async fn delete(mut self) {
        if let Some(name) = &self.name {
            delete_unit(self.backend.as_ref(), name).await;
        }
        // Disarm only once the delete has returned
        self.name = None;
    }
}

impl Drop for UnitCleanup {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Run of execution unit {name} was cancelled, deleting it in the background");
                let backend = self.backend.clone();
                handle.spawn(async move {
                    delete_unit(backend.as_ref(), &name).await;
                });
            }
            Err(_) => {
                warn!("Run of execution unit {name} was cancelled outside a runtime, it may be orphaned");
            }
        }
    }
}

async fn delete_unit(backend: &dyn ExecutionBackend, name: &str) {
    match backend.delete(name).await {
        Ok(()) => debug!("Deleted execution unit {name}"),
        Err(e) => warn!("Failed to delete execution unit {name}, it may be orphaned: {e}"),
    }
}

/// Builds a unique unit name: `task-runner-<task id>-<unix millis>-<random>`.
///
/// The task id is lowercased and stripped down to `[a-z0-9-]` and
/// shortened so the whole name stays a valid DNS-1123 label. The
/// random suffix keeps two runs started in the same millisecond apart.
pub fn unit_name(task_id: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..6];

    let fixed = UNIT_PREFIX.len() + format!("-{millis}-{suffix}").len();
    let budget = MAX_UNIT_NAME.saturating_sub(fixed + 1);

    let mut id: String = task_id
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    id.truncate(budget);
    let id = id.trim_matches('-');

    if id.is_empty() {
        format!("{UNIT_PREFIX}-{millis}-{suffix}")
    } else {
        format!("{UNIT_PREFIX}-{id}-{millis}-{suffix}")
    }
}
