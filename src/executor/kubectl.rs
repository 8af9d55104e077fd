//! Kubernetes backend: one bare pod per execution unit, driven
//! through the `kubectl` CLI so it honours the operator's kubeconfig.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::cli::CliRunner;
use super::{BackendError, ExecutionBackend, UnitPhase, UnitSpec, CONTAINER_NAME};

/// Label put on every pod this service creates, for manual cleanup
/// (`kubectl delete pod -l app.kubernetes.io/managed-by=task-runner`).
const MANAGED_BY: &str = "task-runner";

pub struct KubectlBackend {
    cli: CliRunner,
    namespace: String,
}

impl KubectlBackend {
    pub fn new(kubectl: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cli: CliRunner::new(kubectl),
            namespace: namespace.into(),
        }
    }
}

/// Pod manifest for a unit: never restarted, single container.
pub fn pod_manifest(spec: &UnitSpec, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": spec.name,
            "namespace": namespace,
            "labels": {
                "app.kubernetes.io/managed-by": MANAGED_BY
            }
        },
        "spec": {
            "restartPolicy": "Never",
            "containers": [{
                "name": CONTAINER_NAME,
                "image": spec.image,
                "command": spec.command
            }]
        }
    })
}

/// Maps `.status.phase` to a `UnitPhase`. A freshly created pod may
/// not report a phase yet; that counts as pending.
pub fn parse_pod_phase(raw: &str) -> UnitPhase {
    match raw.trim() {
        "" | "Pending" => UnitPhase::Pending,
        "Running" => UnitPhase::Running,
        "Succeeded" => UnitPhase::Succeeded,
        "Failed" => UnitPhase::Failed,
        _ => UnitPhase::Unknown,
    }
}

#[async_trait]
impl ExecutionBackend for KubectlBackend {
    async fn create(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let manifest = serde_json::to_vec(&pod_manifest(spec, &self.namespace))
            .map_err(|e| BackendError::Unexpected(format!("encoding pod manifest: {e}")))?;
        self.cli
            .run_checked(
                &["create", "-n", self.namespace.as_str(), "-f", "-"],
                Some(manifest.as_slice()),
            )
            .await?;
        Ok(())
    }

    async fn phase(&self, name: &str) -> Result<UnitPhase, BackendError> {
        let args = [
            "get",
            "pod",
            name,
            "-n",
            self.namespace.as_str(),
            "-o",
            "jsonpath={.status.phase}",
        ];
        let output = self.cli.run(&args, None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("NotFound") {
                return Err(BackendError::NotFound(name.to_string()));
            }
            return Err(self.cli.command_error(&args, &output));
        }
        Ok(parse_pod_phase(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn logs(&self, name: &str) -> Result<String, BackendError> {
        self.cli
            .run_checked(
                &["logs", name, "-n", self.namespace.as_str(), "-c", CONTAINER_NAME],
                None,
            )
            .await
    }

    async fn delete(&self, name: &str) -> Result<(), BackendError> {
        self.cli
            .run_checked(
                &[
                    "delete",
                    "pod",
                    name,
                    "-n",
                    self.namespace.as_str(),
                    "--ignore-not-found",
                    "--wait=false",
                ],
                None,
            )
            .await?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("kubernetes (namespace {})", self.namespace)
    }
}
