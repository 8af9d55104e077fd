//! Execution units: ephemeral, isolated runtimes that run exactly
//! one command and are then discarded.
//!
//! `ExecutionBackend` abstracts over the system that hosts the units
//! (a Kubernetes cluster driven through `kubectl`, or a local Docker
//! daemon). `Provisioner` drives one unit through its whole lifecycle
//! on top of any backend.

pub mod cli;
pub mod docker;
#[cfg(test)]
pub mod fake;
pub mod kubectl;
pub mod provisioner;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BackendConfig, ExecutorConfig};

pub use docker::DockerBackend;
pub use kubectl::KubectlBackend;
pub use provisioner::{ExecutionOutcome, Provisioner};
#[cfg(test)]
pub use provisioner::Stage;

/// Name of the single container inside every unit.
pub const CONTAINER_NAME: &str = "task-runner-container";

/// Everything a backend needs to create a unit.
///
/// Units never restart: once the command exits the unit stays in
/// its terminal phase until deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    /// Unique DNS-1123 label, also used to address the unit afterwards.
    pub name: String,
    pub image: String,
    /// Entry command, e.g. `["sh", "-c", "echo hello"]`.
    pub command: Vec<String>,
}

impl UnitSpec {
    /// A unit that runs `command` through `sh -c`.
    pub fn shell(name: impl Into<String>, image: impl Into<String>, command: &str) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: vec!["sh".to_string(), "-c".to_string(), command.to_string()],
        }
    }
}

/// Lifecycle phase of a unit, modelled on Kubernetes pod phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Running,
    /// The command exited zero.
    Succeeded,
    /// The command exited non-zero.
    Failed,
    Unknown,
}

impl UnitPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed)
    }
}

impl std::fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitPhase::Pending => "Pending",
            UnitPhase::Running => "Running",
            UnitPhase::Succeeded => "Succeeded",
            UnitPhase::Failed => "Failed",
            UnitPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write input to {program}: {source}")]
    Stdin {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program} {args}` exited with {status}: {stderr}")]
    Command {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },
    #[error("execution unit {0} not found")]
    NotFound(String),
    #[error("unexpected backend response: {0}")]
    Unexpected(String),
}

/// The system hosting execution units.
///
/// Implementations are addressed by unit name only; they hold the
/// namespace/daemon details themselves.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Creates the unit and submits it for scheduling.
    async fn create(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    /// Reads the unit's current phase.
    async fn phase(&self, name: &str) -> Result<UnitPhase, BackendError>;

    /// Returns everything the unit wrote to stdout and stderr.
    async fn logs(&self, name: &str) -> Result<String, BackendError>;

    /// Deletes the unit. Deleting an already-gone unit may error.
    async fn delete(&self, name: &str) -> Result<(), BackendError>;

    /// Human-readable description, e.g. `"kubernetes (namespace default)"`.
    fn description(&self) -> String;
}

/// Builds the backend selected by the `[executor]` config table.
pub fn backend_from_config(config: &ExecutorConfig) -> Arc<dyn ExecutionBackend> {
    match &config.backend {
        BackendConfig::Kubernetes { namespace, kubectl } => {
            Arc::new(KubectlBackend::new(kubectl.clone(), namespace.clone()))
        }
        BackendConfig::Docker { docker } => Arc::new(DockerBackend::new(docker.clone())),
    }
}
