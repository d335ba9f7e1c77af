//! `taskline` — offline-first task list.
//!
//! Every invocation loads the local list, tries to reach the peer (replaying
//! anything queued from earlier offline runs), runs one subcommand, and
//! exits. Changes made while the peer is unreachable are kept locally and
//! sent on a later run.
//!
//! ```bash
//! taskline --endpoint 127.0.0.1:5000 add "Pay rent" --date 2025-02-01
//! taskline list --view today
//! taskline done "Pay rent" --date 2025-02-01
//! TASKLINE_ENDPOINT=10.0.0.5:5000 taskline sync
//! ```

use std::path::Path;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskline::client::TcpCommandClient;
use taskline::config::{CliArgs, CliCommand, ClientConfig, ViewArg};
use taskline::store::{StoreError, TaskStore, local_today};
use taskline::sync::{
    self, ConnectivitySignal, EngineError, ResyncOutcome, SyncHandle, SyncState,
};
use taskline_proto::task::{PendingKind, Task, TaskKey};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("sync engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let (config, _log_guard) = start(&cli);
    tracing::info!(
        endpoint = %config.endpoint,
        state_file = %config.state_file.display(),
        "taskline starting"
    );

    let command = cli.command.unwrap_or(CliCommand::List {
        view: ViewArg::All,
    });
    let result = run(command, &config).await;
    tracing::info!("taskline exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Installs logging, then resolves the config so endpoint fallbacks are
/// recorded in the log.
fn start(cli: &CliArgs) -> (ClientConfig, Option<WorkerGuard>) {
    let guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    let config = match ClientConfig::load(cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config file; using defaults");
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };
    (config, guard)
}

/// Initialize file-based logging so stdout stays clean for command output.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to flush
/// buffered entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskline.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: CliCommand, config: &ClientConfig) -> Result<(), CliError> {
    let store = TaskStore::open(&config.state_file)?;
    let client = TcpCommandClient::new(config.endpoint.to_string())
        .with_connect_timeout(config.connect_timeout);
    let (handle, _events, engine) = sync::spawn(client, store, config.channel_capacity);

    let outcome = handle.signal(ConnectivitySignal::Available).await?;
    if let ResyncOutcome::Failed(e) = &outcome {
        eprintln!("offline ({e}); changes will be sent on a later run");
    }

    let result = execute(&handle, command).await;
    handle.shutdown().await;
    engine.await?;
    result
}

async fn execute(handle: &SyncHandle, command: CliCommand) -> Result<(), CliError> {
    match command {
        CliCommand::List { view } => {
            let tasks = handle.tasks(view.into()).await?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in &tasks {
                println!("{}", render_line(task));
            }
        }
        CliCommand::Add { name, date } => {
            let task = handle.add(&name, date.unwrap_or_else(local_today)).await?;
            println!("added {}", render_line(&task));
        }
        CliCommand::Done { name, date } => {
            let task = handle.set_completed(key(&name, date), true).await?;
            println!("{}", render_line(&task));
        }
        CliCommand::Undo { name, date } => {
            let task = handle.set_completed(key(&name, date), false).await?;
            println!("{}", render_line(&task));
        }
        CliCommand::Rm { name, date } => {
            let key = key(&name, date);
            handle.delete(key.clone()).await?;
            println!("removed {key}");
        }
        CliCommand::Sync => {
            let state = handle.state().await?;
            let pending = handle.pending_len().await?;
            match state {
                SyncState::Online => println!("in sync with peer"),
                _ => println!("{state}; {pending} change(s) queued"),
            }
        }
    }
    Ok(())
}

fn key(name: &str, date: Option<NaiveDate>) -> TaskKey {
    TaskKey::new(name, date.unwrap_or_else(local_today))
}

fn render_line(task: &Task) -> String {
    let mark = if task.completed() { 'x' } else { ' ' };
    let note = match task.pending_kind() {
        PendingKind::None => "",
        PendingKind::UncommittedCreate => "  (not synced)",
        PendingKind::UncommittedDelete => "  (deleting)",
    };
    format!("[{mark}] {}  {}{note}", task.date(), task.name())
}
