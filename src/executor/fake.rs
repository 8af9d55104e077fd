//! Scripted in-memory backend for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BackendError, ExecutionBackend, UnitPhase, UnitSpec};

/// Backend double that records every call.
///
/// By default a unit reports `Running` on its first poll and
/// `Succeeded` afterwards, and its logs emulate `echo`: a command
/// `echo hello` yields `"hello\n"`.
pub struct FakeBackend {
    final_phase: Option<UnitPhase>,
    output: Option<String>,
    fail_create: Option<String>,
    fail_logs: Option<String>,
    fail_delete: Option<String>,
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    created: Vec<UnitSpec>,
    deleted: Vec<String>,
    polls: HashMap<String, u32>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            final_phase: Some(UnitPhase::Succeeded),
            output: None,
            fail_create: None,
            fail_logs: None,
            fail_delete: None,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Units stay `Running` forever.
    pub fn never_finishing() -> Self {
        Self {
            final_phase: None,
            ..Self::new()
        }
    }

    pub fn finishing_with(mut self, phase: UnitPhase) -> Self {
        self.final_phase = Some(phase);
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    pub fn failing_logs(mut self, message: &str) -> Self {
        self.fail_logs = Some(message.to_string());
        self
    }

    pub fn failing_delete(mut self, message: &str) -> Self {
        self.fail_delete = Some(message.to_string());
        self
    }

    pub fn created(&self) -> Vec<UnitSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn emulate(command: &[String]) -> String {
        let script = command.last().map(String::as_str).unwrap_or("");
        match script.strip_prefix("echo ") {
            Some(text) => format!("{text}\n"),
            None => String::new(),
        }
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn create(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        if let Some(message) = &self.fail_create {
            return Err(BackendError::Unexpected(message.clone()));
        }
        self.state.lock().unwrap().created.push(spec.clone());
        Ok(())
    }

    async fn phase(&self, name: &str) -> Result<UnitPhase, BackendError> {
        let mut state = self.state.lock().unwrap();
        if !state.created.iter().any(|s| s.name == name) {
            return Err(BackendError::NotFound(name.to_string()));
        }
        let polls = state.polls.entry(name.to_string()).or_insert(0);
        *polls += 1;
        match self.final_phase {
            Some(phase) if *polls > 1 => Ok(phase),
            _ => Ok(UnitPhase::Running),
        }
    }

    async fn logs(&self, name: &str) -> Result<String, BackendError> {
        if let Some(message) = &self.fail_logs {
            return Err(BackendError::Unexpected(message.clone()));
        }
        let state = self.state.lock().unwrap();
        let spec = state
            .created
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;
        Ok(self
            .output
            .clone()
            .unwrap_or_else(|| Self::emulate(&spec.command)))
    }

    async fn delete(&self, name: &str) -> Result<(), BackendError> {
        self.state.lock().unwrap().deleted.push(name.to_string());
        match &self.fail_delete {
            Some(message) => Err(BackendError::Unexpected(message.clone())),
            None => Ok(()),
        }
    }

    fn description(&self) -> String {
        "fake".to_string()
    }
}
