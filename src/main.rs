//! filedash -- terminal front end for the file and todo dashboard.
//!
//! Every invocation mounts a fresh view: build the store from config, run
//! the initial refresh, apply one intent, print the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use filedash::catalog::ObjectRecord;
use filedash::config::{Config, LoggingConfig};
use filedash::todos::sqlite::SqliteTodoStore;
use filedash::{FileSyncController, TodoBoard, UploadFile};
use tracing::info;
use uuid::Uuid;

const DEFAULT_CONFIG_PATH: &str = "filedash.yaml";

/// Command-line arguments for filedash.
#[derive(Parser, Debug)]
#[command(
    name = "filedash",
    version,
    about = "Personal file and todo dashboard over a remote object store"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the owner id from the configuration.
    #[arg(long)]
    owner: Option<String>,

    /// Print listings as JSON.
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the command.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Files(FileCommand),
    /// Manage the todo list
    Todo {
        #[command(subcommand)]
        action: TodoCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FileCommand {
    /// List the owner's files
    List,
    /// Upload one or more files concurrently
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete a file by key
    Remove { key: String },
    /// Resolve a time-limited URL for a file
    Url {
        key: String,
        /// Ask for a download link instead of a view link.
        #[arg(long)]
        download: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TodoCommand {
    /// List todos
    List,
    /// Add a todo
    Add {
        #[arg(required = true)]
        content: Vec<String>,
    },
    /// Delete a todo
    Remove { id: Uuid },
    /// Toggle a todo's done flag
    Done { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(owner) = cli.owner.clone() {
        config.owner.id = owner;
    }
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if cli.metrics && config.observability.metrics {
        filedash::metrics::init_metrics()?;
        filedash::metrics::describe_metrics();
    }

    let result = match cli.command {
        Commands::Todo { action } => run_todo(&config, action, cli.json).await,
        Commands::Files(command) => run_files(&config, command, cli.json).await,
    };

    if cli.metrics {
        if let Some(text) = filedash::metrics::render() {
            print!("{text}");
        }
    }
    result
}

/// Read the config file; a missing file is fine only at the default path.
fn load_config(path: &str) -> anyhow::Result<Config> {
    if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        return Ok(Config::default());
    }
    filedash::config::load_config(path)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_files(config: &Config, command: FileCommand, json: bool) -> anyhow::Result<()> {
    let store = filedash::storage::build_store(&config.storage).await?;
    let controller = Arc::new(FileSyncController::from_config(store, config));

    // Mount: initial full sync.
    if controller.refresh().await.is_none() {
        return Err(failure(&controller));
    }

    match command {
        FileCommand::List => print_records(&controller.catalog(), json)?,
        FileCommand::Upload { paths } => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                files.push(UploadFile::from_path(path).await?);
            }

            let progress = tokio::spawn(log_progress(controller.clone()));
            let uploads = files.into_iter().map(|file| {
                let controller = controller.clone();
                async move { controller.upload(file).await }
            });
            let results = futures::future::join_all(uploads).await;
            progress.abort();

            let stored: Vec<ObjectRecord> = results.iter().flatten().cloned().collect();
            print_records(&stored, json)?;
            if stored.len() != results.len() {
                return Err(failure(&controller));
            }
        }
        FileCommand::Remove { key } => {
            if !controller.remove(&key).await {
                return Err(failure(&controller));
            }
            println!("removed {key}");
        }
        FileCommand::Url { key, download } => {
            let url = if download {
                controller.resolve_download_url(&key).await
            } else {
                controller.resolve_access_url(&key).await
            };
            match url {
                Some(url) => println!("{url}"),
                None => return Err(failure(&controller)),
            }
        }
    }
    Ok(())
}

/// Log aggregate upload progress until aborted.
async fn log_progress(controller: Arc<FileSyncController>) {
    let mut status = controller.watch_uploads();
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        if current.in_flight {
            info!(
                "uploading {} file(s): {}%",
                controller.uploads().len(),
                current.percent
            );
        }
    }
}

async fn run_todo(config: &Config, action: TodoCommand, json: bool) -> anyhow::Result<()> {
    let store = Arc::new(SqliteTodoStore::new(&config.todos.sqlite.path)?);
    let board = TodoBoard::new(store, config.owner.id.clone());
    if board.refresh().await.is_none() {
        anyhow::bail!("could not load todos");
    }

    let ok = match action {
        TodoCommand::List => true,
        TodoCommand::Add { content } => board.create(&content.join(" ")).await.is_some(),
        TodoCommand::Remove { id } => board.delete(id).await,
        TodoCommand::Done { id } => board.toggle_done(id).await.is_some(),
    };

    let todos = board.todos();
    if json {
        println!("{}", serde_json::to_string_pretty(&todos)?);
    } else {
        for todo in &todos {
            println!(
                "[{}] {}  {}",
                if todo.is_done { "x" } else { " " },
                todo.id,
                todo.content.as_deref().unwrap_or("")
            );
        }
    }

    if !ok {
        let reason = board
            .diagnostics()
            .pop()
            .map(|d| d.message)
            .unwrap_or_else(|| "nothing to do".to_string());
        anyhow::bail!("todo command failed: {reason}");
    }
    Ok(())
}

fn print_records(records: &[ObjectRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    for record in records {
        println!(
            "{}\t{}\t{}\t{}",
            record.key,
            record.size_bytes,
            record.content_type,
            record.last_modified.to_rfc3339()
        );
    }
    Ok(())
}

fn failure(controller: &FileSyncController) -> anyhow::Error {
    match controller.last_diagnostic() {
        Some(diag) => anyhow::anyhow!("{} failed: {}", diag.operation, diag.message),
        None => anyhow::anyhow!("operation failed"),
    }
}
