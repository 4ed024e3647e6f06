//! agentwire agent binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Build the action registry, task service and persistent task registry
//! 3. Resume tasks journaled by a previous run
//! 4. Serve JSON-lines requests from stdin, one response line per request
//!    on stdout, until EOF or Ctrl-C
//!
//! Logs go to stderr so stdout carries only protocol traffic.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use agentwire_agent::action::{ActionContext, CommandSupervisor};
use agentwire_agent::{
    ActionDispatcher, ActionRegistry, HostsFileWriter, LocalBlobstore, SyncDnsAction,
    TaskManager, TaskService,
};
use agentwire_core::config::AgentConfig;
use agentwire_core::fs::{FileSystem, OsFileSystem};
use agentwire_core::types::{Request, Response};

use cli::{expand_home, CliArgs};

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn build_dispatcher(config: &AgentConfig) -> ActionDispatcher {
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
    let task_service = Arc::new(TaskService::with_retention(Duration::from_secs(
        config.agent.finished_task_retention_secs,
    )));
    let task_manager = Arc::new(TaskManager::new(Arc::clone(&fs), config.task_file_path()));

    let blobstore = Arc::new(LocalBlobstore::new(
        expand_home(&config.dns.blobstore_dir),
        expand_home(&config.dns.tmp_dir),
    ));
    let hosts = Arc::new(HostsFileWriter::new(
        Arc::clone(&fs),
        expand_home(&config.dns.hosts_path),
    ));
    let sync_dns = Arc::new(SyncDnsAction::new(
        blobstore,
        hosts,
        Arc::clone(&fs),
        config.dns_state_path(),
    ));

    let mut registry = ActionRegistry::new();
    registry.register_defaults(ActionContext {
        task_service: Arc::clone(&task_service),
        supervisor: Arc::new(CommandSupervisor::new(config.agent.stop_command.clone())),
        scripts_dir: expand_home(&config.agent.scripts_dir),
        sync_dns,
    });
    for command in &config.agent.commands {
        tracing::info!(method = %command.method, program = %command.program, "Registering command action");
        registry.register_command(command.clone());
    }
    tracing::info!(methods = ?registry.methods(), "Action registry ready");

    ActionDispatcher::new(registry, task_service, task_manager)
}

async fn handle_line(dispatcher: &ActionDispatcher, line: String) -> Response {
    match Request::decode(line.into_bytes()) {
        Ok(request) => dispatcher.dispatch(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed request");
            Response::exception(format!("Unmarshalling request: {}", e))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level applies; the
    // outcome is logged right after.
    let config_file = args.resolve_config_path();
    let loaded = AgentConfig::load(&config_file);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();

    let level = args
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());
    init_tracing(&level);

    tracing::info!("Starting agentwire v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults"),
    }

    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    config.general.data_dir = data_dir.to_string_lossy().to_string();

    let dispatcher = build_dispatcher(&config);
    match dispatcher.resume_previously_dispatched_tasks() {
        Ok(count) => tracing::info!(count, "Resumed previously dispatched tasks"),
        Err(e) => tracing::error!(error = %e, "Failed to resume previously dispatched tasks"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("Input closed, shutting down");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&dispatcher, line).await;
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }

    Ok(())
}
