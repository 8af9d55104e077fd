//! Local backend: one detached container per execution unit, driven
//! through the `docker` CLI (or any CLI-compatible runtime such as
//! `podman`).

use async_trait::async_trait;

use super::cli::CliRunner;
use super::{BackendError, ExecutionBackend, UnitPhase, UnitSpec};

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by=task-runner";

pub struct DockerBackend {
    cli: CliRunner,
}

impl DockerBackend {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            cli: CliRunner::new(docker),
        }
    }
}

/// Maps `docker inspect` output (`"<status> <exit code>"`) to a phase.
pub fn parse_container_state(raw: &str) -> UnitPhase {
    let mut parts = raw.split_whitespace();
    let status = parts.next().unwrap_or("");
    let exit_code = parts.next().and_then(|c| c.parse::<i64>().ok());

    match status {
        "created" | "restarting" => UnitPhase::Pending,
        "running" | "paused" => UnitPhase::Running,
        "exited" | "dead" => match exit_code {
            Some(0) => UnitPhase::Succeeded,
            _ => UnitPhase::Failed,
        },
        _ => UnitPhase::Unknown,
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn create(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let mut args = vec![
            "run",
            "--detach",
            "--name",
            spec.name.as_str(),
            "--restart",
            "no",
            "--label",
            MANAGED_BY_LABEL,
            spec.image.as_str(),
        ];
        args.extend(spec.command.iter().map(String::as_str));
        self.cli.run_checked(&args, None).await?;
        Ok(())
    }

    async fn phase(&self, name: &str) -> Result<UnitPhase, BackendError> {
        let args = [
            "inspect",
            "--format",
            "{{.State.Status}} {{.State.ExitCode}}",
            name,
        ];
        let output = self.cli.run(&args, None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Err(BackendError::NotFound(name.to_string()));
            }
            return Err(self.cli.command_error(&args, &output));
        }
        Ok(parse_container_state(&String::from_utf8_lossy(&output.stdout)))
    }

    /// `docker logs` replays the container's stdout and stderr on the
    /// matching streams; both are returned, stdout first.
    async fn logs(&self, name: &str) -> Result<String, BackendError> {
        let args = ["logs", name];
        let output = self.cli.run(&args, None).await?;
        if !output.status.success() {
            return Err(self.cli.command_error(&args, &output));
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    async fn delete(&self, name: &str) -> Result<(), BackendError> {
        self.cli.run_checked(&["rm", "--force", name], None).await?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("docker ({})", self.cli.program())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_state() {
        assert_eq!(parse_container_state("created 0"), UnitPhase::Pending);
        assert_eq!(parse_container_state("running 0\n"), UnitPhase::Running);
        assert_eq!(parse_container_state("exited 0"), UnitPhase::Succeeded);
        assert_eq!(parse_container_state("exited 127"), UnitPhase::Failed);
        assert_eq!(parse_container_state("dead 137"), UnitPhase::Failed);
        assert_eq!(parse_container_state("exited"), UnitPhase::Failed);
        assert_eq!(parse_container_state("removing 0"), UnitPhase::Unknown);
        assert_eq!(parse_container_state(""), UnitPhase::Unknown);
    }

    #[test]
    fn test_description() {
        assert_eq!(DockerBackend::new("docker").description(), "docker (docker)");
    }

    #[tokio::test]
    async fn test_delete_fails_cleanly_without_docker() {
        let backend = DockerBackend::new("no-such-docker-binary-4242");
        let err = backend.delete("unit").await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}
