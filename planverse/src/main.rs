//! `planverse`: command-line client for a personal task collection.
//!
//! Each mutating command loads the stored tasks, applies one edit
//! optimistically, runs a single reconciliation pass and reports any
//! write the store refused.
//!
//! ```bash
//! planverse --user alice add --title "Submit essay" --due 2024-07-26 --priority high
//! planverse --user alice list
//! PLANVERSE_USER=alice planverse toggle <id>
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use planverse::config::{CliArgs, Command, ConfigError, PlanverseConfig, StoreBackend};
use planverse::store::{JsonFileStore, MemoryStore, StoreError, TaskStore};
use planverse::sync::{FailureNotifier, Reconciler};
use planverse::tasks::{SyncState, TaskError, TaskList, parse_due_date};
use planverse_proto::{CollectionPath, TaskDraft, TaskEdit, TaskId};

/// Errors that end a CLI run.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The requested edit was rejected locally.
    #[error(transparent)]
    Task(#[from] TaskError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("planverse starting");
    let result = run(cli).await;
    tracing::info!("planverse exiting");

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so they never interleave with command output.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("planverse.log");
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

async fn run(cli: CliArgs) -> Result<ExitCode, CliError> {
    let config = PlanverseConfig::load(&cli)?;
    let path = config.to_collection_path()?;
    let command = cli.command.unwrap_or(Command::List);

    tracing::debug!(backend = ?config.backend, %path, "resolved configuration");
    match config.backend {
        StoreBackend::File => {
            let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
            run_with(store, path, &config, command).await
        }
        StoreBackend::Memory => run_with(Arc::new(MemoryStore::new()), path, &config, command).await,
    }
}

async fn run_with<S: TaskStore + 'static>(
    store: Arc<S>,
    path: CollectionPath,
    config: &PlanverseConfig,
    command: Command,
) -> Result<ExitCode, CliError> {
    let mut list = TaskList::from_snapshot(store.list(&path).await?);

    match command {
        Command::List => {
            print_tasks(&list);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Add {
            title,
            due,
            description,
            priority,
        } => {
            let mut draft = TaskDraft::new(title, parse_due_date(&due)?);
            draft.description = description;
            draft.priority = priority;
            list.add(draft)?;
        }
        Command::Edit {
            id,
            title,
            due,
            description,
            clear_description,
            priority,
        } => {
            let edit = TaskEdit {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                due_date: due.as_deref().map(parse_due_date).transpose()?,
                priority,
                completed: None,
            };
            if !list.edit(&TaskId::from(id), &edit)? {
                println!("nothing to change");
                return Ok(ExitCode::SUCCESS);
            }
        }
        Command::Toggle { id } => {
            list.toggle_complete(&TaskId::from(id))?;
        }
        Command::Remove { id } => {
            list.remove(&TaskId::from(id))?;
        }
    }

    let (notifier, mut failures) = FailureNotifier::channel(config.failure_buffer);
    let reconciler = Reconciler::new(store, path).with_notifier(notifier);
    let handle = list.commit(&reconciler);
    // The channel closes once the reconciler and every write are gone.
    drop(reconciler);

    let drain = async {
        let mut failed = false;
        while let Some(failure) = failures.recv().await {
            eprintln!("sync failed: {failure}");
            failed = true;
        }
        failed
    };
    let (report, failed) = tokio::join!(handle.wait(), drain);
    list.apply_report(&report);

    print_tasks(&list);

    if failed || !report.is_complete_success() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_tasks(list: &TaskList) {
    if list.tasks().is_empty() {
        println!("no tasks");
        return;
    }
    for task in list.tasks() {
        let mark = if task.completed { "x" } else { " " };
        let id = task.id.as_ref().map_or("-", TaskId::as_str);
        let state = match task.id.as_ref().and_then(|id| list.sync_state(id)) {
            Some(SyncState::Pending) => " (pending)",
            Some(SyncState::Failed(_)) => " (not saved)",
            Some(SyncState::Confirmed) | None => "",
        };
        println!(
            "[{mark}] {due}  {priority:<6}  {title}  {id}{state}",
            due = task.due_date.format("%Y-%m-%d %H:%M"),
            priority = task.priority.to_string(),
            title = task.title,
        );
    }
}
