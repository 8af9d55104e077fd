mod backoff;
mod config;
mod executor;
mod http;
mod service;
mod storage;
mod task;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, StorageBackend};
use crate::executor::Provisioner;
use crate::http::Router;
use crate::service::TaskService;

fn print_help() {
    println!(
        "\
task-runner v{}

A REST service that stores shell tasks and runs each execution in a
single-use, isolated unit (a Kubernetes pod or a Docker container).

USAGE:
    task-runner [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/task-runner.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG      Log level filter for tracing
                  (e.g. debug, task_runner=debug,warn)
    KUBECONFIG    Cluster credentials used by kubectl (kubernetes backend)

SECURITY:
    Task commands run verbatim through `sh -c` inside the execution unit.
    Anyone who can reach the API can run arbitrary commands there: expose
    it to trusted operators only.

EXAMPLES:
    task-runner                               # uses config/task-runner.toml
    task-runner /etc/task-runner/config.toml  # custom config path
    RUST_LOG=debug task-runner                # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("task-runner v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("task_runner=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/task-runner.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    let repository = storage::open(&config.storage).await?;
    info!(
        "Storage: {:?}{}",
        config.storage.backend,
        match config.storage.backend {
            StorageBackend::File => format!(" ({})", config.storage.path.display()),
            StorageBackend::Memory => " (tasks are lost on exit)".to_string(),
        }
    );

    let backend = executor::backend_from_config(&config.executor);
    let provisioner = Provisioner::new(backend, &config.executor.image, config.executor.timeout());
    info!(
        "Executor: {}, image {}, timeout {}s",
        provisioner.backend_description(),
        config.executor.image,
        provisioner.timeout().as_secs()
    );
    warn!("Task commands run unsandboxed through `sh -c` inside each unit; only expose this API to trusted operators");

    let service = Arc::new(TaskService::new(repository, provisioner));
    let router = Arc::new(Router::new(service));

    let listener = TcpListener::bind(config.server.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr()))?;

    // Ctrl-C stops accepting; in-flight executions finish and clean up
    // their units before the process exits.
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, draining in-flight requests"),
            Err(e) => {
                error!("Failed to listen for the shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    http::serve(listener, router, config.server.read_timeout(), shutdown).await
}
