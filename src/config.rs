use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for a client to finish sending one request
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Directory holding one JSON document per task (file backend only)
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    #[serde(flatten)]
    pub backend: BackendConfig,
    /// Base image of every execution unit
    #[serde(default = "default_image")]
    pub image: String,
    /// Wall-clock ceiling for a unit to reach a terminal phase
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    Kubernetes {
        #[serde(default = "default_namespace")]
        namespace: String,
        /// Path to the kubectl binary. Supports ${ENV_VAR} substitution
        #[serde(default = "default_kubectl")]
        kubectl: String,
    },
    Docker {
        #[serde(default = "default_docker")]
        docker: String,
    },
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/tasks")
}

fn default_image() -> String {
    "busybox".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_docker() -> String {
    "docker".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Kubernetes {
                namespace: default_namespace(),
                kubectl: default_kubectl(),
            },
            image: default_image(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${KUBECTL_PATH}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        if config.executor.timeout_secs == 0 {
            anyhow::bail!("executor.timeout_secs must be greater than zero");
        }
        if config.server.read_timeout_secs == 0 {
            anyhow::bail!("server.read_timeout_secs must be greater than zero");
        }
        Ok(config)
    }
}
