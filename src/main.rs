//! Demo CLI harness for the task lifecycle core.
//!
//! Wires the in-memory [`TaskStore`], the broadcast [`EventBus`], and the
//! [`TaskIngestionPipeline`] together behind a handful of `clap`
//! subcommands. There is no concrete bot-state client, solver, or goal
//! resolver plugged in here — this binary exists to drive the library
//! end to end from a terminal, not to be a deployment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use task_lifecycle_core::domain::models::{TaskSource, TaskStatus};
use task_lifecycle_core::infrastructure::config::ConfigLoader;
use task_lifecycle_core::infrastructure::logging::config::LogConfig as TracingLogConfig;
use task_lifecycle_core::infrastructure::logging::LoggerImpl;
use task_lifecycle_core::services::{
    DedupFailureRegistry, IngestionConfig, MutationOrigin, PartialTask, StatusMachine, TaskFilter,
    TaskIngestionPipeline, TaskStore,
};

#[derive(Parser)]
#[command(name = "task-lifecycle-core", about = "Demo harness for the task lifecycle core")]
struct Cli {
    /// Emit output as JSON instead of a human-readable table.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new task through the full ingestion pipeline.
    Submit {
        title: String,
        #[arg(long, default_value = "manual")]
        task_type: String,
        #[arg(long, default_value_t = 0.5)]
        priority: f64,
        #[arg(long, default_value_t = 0.5)]
        urgency: f64,
    },
    /// List tasks currently in the store.
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single task by id.
    Show { task_id: Uuid },
    /// Mark a task completed.
    Complete { task_id: Uuid },
    /// Mark a task failed with a reason.
    Fail { task_id: Uuid, reason: String },
    /// Print aggregate store statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().unwrap_or_default();
    let _logger = LoggerImpl::init(&TracingLogConfig {
        level: config.log.level.clone(),
        ..TracingLogConfig::default()
    })
    .context("failed to initialize logging")?;

    let cli = Cli::parse();

    let mut store = TaskStore::new(config.max_task_history, config.strict_finalize);
    let mut dedup_registry = DedupFailureRegistry::new(500);
    let events = task_lifecycle_core::services::EventBus::new(256);
    let pipeline = TaskIngestionPipeline::new(
        None,
        None,
        None,
        IngestionConfig {
            strict_finalize: config.strict_finalize,
        },
    );

    match cli.command {
        Commands::Submit {
            title,
            task_type,
            priority,
            urgency,
        } => {
            let mut partial = PartialTask::new(title, task_type, TaskSource::Manual);
            partial.priority = priority;
            partial.urgency = urgency;
            match pipeline.add_task(&mut store, &mut dedup_registry, &events, partial).await.into_task() {
                Some(task) => print_task(&task, cli.json),
                None => println!("dropped: recent Sterling digest already committed"),
            }
        }
        Commands::List { status } => {
            let filter = TaskFilter {
                status: status.and_then(|s| TaskStatus::from_str(&s)),
                ..Default::default()
            };
            let tasks = store.list(&filter);
            if cli.json {
                let values: Vec<Value> = tasks.iter().map(|t| serde_json::to_value(t).unwrap_or(Value::Null)).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for task in tasks {
                    println!("{}  {:<12}  {}", task.id, task.status.as_str(), task.title);
                }
            }
        }
        Commands::Show { task_id } => match store.get(task_id) {
            Some(task) => print_task(task, cli.json),
            None => println!("no such task: {task_id}"),
        },
        Commands::Complete { task_id } => {
            let mut machine = StatusMachine::new(&mut store, &events);
            let outcome = machine.complete(task_id, MutationOrigin::Runtime);
            println!("{outcome:?}");
        }
        Commands::Fail { task_id, reason } => {
            let mut machine = StatusMachine::new(&mut store, &events);
            let outcome = machine.fail(task_id, reason, MutationOrigin::Runtime);
            println!("{outcome:?}");
        }
        Commands::Stats => {
            let stats = store.statistics();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{stats:#?}");
            }
        }
    }

    Ok(())
}

fn print_task(task: &task_lifecycle_core::domain::models::Task, as_json: bool) {
    if as_json {
        println!("{}", serde_json::to_string_pretty(task).unwrap_or_default());
    } else {
        println!("{}  {:<12}  {}", task.id, task.status.as_str(), task.title);
    }
}
