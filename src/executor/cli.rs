use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::BackendError;

/// Runs a backend's command-line client (`kubectl`, `docker`, ...).
pub struct CliRunner {
    program: String,
}

impl CliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the client, optionally feeding `stdin`, and returns its raw
    /// output whatever the exit status.
    ///
    /// The child is killed if the returned future is dropped, so a
    /// caller-side timeout never leaves a stray client running.
    pub async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Output, BackendError> {
        debug!(program = %self.program, args = ?args, "Running backend command");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|source| BackendError::Stdin {
                    program: self.program.clone(),
                    source,
                })?;
            // Closing the pipe signals EOF to the client
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program = %self.program, args = ?args, stderr = %stderr.trim(), "Backend command failed");
        }

        Ok(output)
    }

    /// Like `run`, but a non-zero exit becomes `BackendError::Command`.
    /// Returns stdout on success.
    pub async fn run_checked(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<String, BackendError> {
        let output = self.run(args, stdin).await?;
        if !output.status.success() {
            return Err(self.command_error(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn command_error(&self, args: &[&str], output: &Output) -> BackendError {
        BackendError::Command {
            program: self.program.clone(),
            args: args.join(" "),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}
