//! `pk`: command-line front end for process-kit.
//!
//! Every command loads `.process-kit/` from the project root, opens the
//! configured store and builds a registry over the configured definitions.
//! With the sqlite backend, `pause`, `resume` and `cancel` issued from one
//! invocation are observed by a `pk run` in another at its next step boundary.

mod render;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use pk_core::config::load_config;
use pk_core::engine::RunOutcome;
use pk_core::state::ProcessManager;
use pk_core::store::ListQuery;
use pk_protocol::process_models::{ProcessState, Vars};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pk")]
#[command(about = "Run and control persisted step-by-step processes", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root containing `.process-kit/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log engine activity at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured process types
    #[command(name = "list-definitions")]
    ListDefinitions,

    /// Create a process and run it to completion
    Run {
        /// Name of the process definition
        name: String,

        /// Initial variables as a JSON object
        #[arg(long)]
        vars: Option<String>,
    },

    /// Restore a persisted process and continue running it
    Restore {
        id: Uuid,
    },

    /// Show the persisted status of a process
    Status {
        id: Uuid,
    },

    /// List persisted processes of the configured user
    List {
        /// Only show processes in this state
        #[arg(long)]
        state: Option<ProcessState>,
    },

    /// Pause a process at its next step boundary
    Pause {
        id: Uuid,
    },

    /// Resume a paused process
    Resume {
        id: Uuid,
    },

    /// Cancel a process
    Cancel {
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manager = build_manager(&cli.root).await?;

    match cli.command {
        Commands::ListDefinitions => {
            for name in manager.registered() {
                println!("{name}");
            }
        }
        Commands::Run { name, vars } => {
            let vars = parse_vars(vars.as_deref())?;
            let process = manager.create(&name, vars, None).await?;
            println!(
                "{} {} {}",
                "created".green().bold(),
                process.process_type(),
                process.id()
            );
            drive(&manager, process.id()).await?;
        }
        Commands::Restore { id } => {
            manager.restore(id).await?;
            drive(&manager, id).await?;
        }
        Commands::Status { id } => {
            let record = manager.store().get(id).await?;
            println!("{}", render::record_line(&record));
            println!("{}", serde_json::to_string_pretty(&record.vars)?);
        }
        Commands::List { state } => {
            let query = match state {
                Some(state) => ListQuery::default().with_state(state),
                None => ListQuery::default(),
            };
            for record in manager.records(query).await? {
                println!("{}", render::record_line(&record));
            }
        }
        Commands::Pause { id } => {
            manager.restore(id).await?.pause().await?;
            println!("{} {id}", "paused".yellow().bold());
        }
        Commands::Resume { id } => {
            manager.restore(id).await?.resume().await?;
            println!("{} {id}", "resumed".green().bold());
        }
        Commands::Cancel { id } => {
            manager.restore(id).await?.cancel().await?;
            println!("{} {id}", "cancelled".red().bold());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pk_core=debug,pk_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pk_core=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn build_manager(root: &Path) -> Result<ProcessManager> {
    tracing::debug!(root = %root.display(), "loading configuration");
    let config = load_config(root)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {}", root.display()))?;
    let store = config
        .open_store(root)
        .wrap_err("Failed to open process store")?;
    Ok(config.build_manager(store)?)
}

fn parse_vars(raw: Option<&str>) -> Result<Vars> {
    let Some(raw) = raw else {
        return Ok(Vars::new());
    };
    match serde_json::from_str::<Value>(raw).wrap_err("--vars must be valid JSON")? {
        Value::Object(vars) => Ok(vars),
        other => Err(eyre!("--vars must be a JSON object, got {other}")),
    }
}

/// Run a tracked process to the end, printing its events as they arrive.
async fn drive(manager: &ProcessManager, id: Uuid) -> Result<()> {
    let process = match manager.get(id) {
        Ok(process) => process,
        Err(_) => {
            let record = manager.store().get(id).await?;
            println!("{}", render::record_line(&record));
            return Ok(());
        }
    };

    process.events().on_any(move |name, event| {
        println!("{}", render::event_line(id, name, event));
    });

    match process.run().await? {
        RunOutcome::Done => Ok(()),
        RunOutcome::Halted(state) => {
            println!("{} {id} ({state})", "halted".yellow().bold());
            Ok(())
        }
    }
}
