//! chainlog
//!
//! Command line front end for the chain logger:
//! - Replay recorded chain events into the logger and its stores
//! - Resolve the identity used in store file names
//! - Inspect an existing store

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use chainlog_core::{IdentityProvider, LoggerConfig, NotebookIdentity};
use chainlog_tracker::ChainLogger;

mod events;

#[derive(Parser, Debug)]
#[command(name = "chainlog")]
#[command(about = "Log chain runs to schema-evolving CSV stores")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the store files
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// User name for store file names ("auto" reads the notebook identity)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Experiment name for store file names
    #[arg(long, global = true)]
    experiment: Option<String>,

    /// Input key logged as the run's input
    #[arg(long, global = true)]
    input_keyword: Option<String>,

    /// Log every run on its own instead of merging into the primary
    #[arg(long, global = true)]
    no_combine: bool,

    /// Deepest child level merged into the primary record
    #[arg(long, global = true)]
    merge_depth: Option<usize>,

    /// Ask for a rating after each primary response
    #[arg(long, global = true)]
    rating: bool,

    /// Ask for comments after each primary response
    #[arg(long, global = true)]
    comments: bool,

    /// Keep records in memory only
    #[arg(long, global = true)]
    no_csv: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Feed a JSON-lines event log through the logger
    Replay {
        /// Path to the event log
        events: PathBuf,
    },
    /// Print the user name store files would be written for
    Whoami,
    /// Print the columns and row count of a store file
    Show {
        /// Path to the CSV store
        file: PathBuf,
    },
}

impl Args {
    /// Environment config with command line overrides applied.
    fn logger_config(&self) -> LoggerConfig {
        let mut config = LoggerConfig::from_env();
        if let Some(path) = &self.path {
            config = config.with_path(path.clone());
        }
        if let Some(user) = &self.user {
            config = config.with_user_name(resolve_user(user));
        }
        if let Some(experiment) = &self.experiment {
            config = config.with_experiment_name(experiment.clone());
        }
        if let Some(keyword) = &self.input_keyword {
            config = config.with_input_keyword(keyword.clone());
        }
        if self.no_combine {
            config = config.with_combine_runs(false);
        }
        if self.merge_depth.is_some() {
            config = config.with_merge_depth(self.merge_depth);
        }
        if self.rating || self.comments {
            let request_rating = self.rating || config.request_rating;
            let request_comments = self.comments || config.request_comments;
            config = config.with_feedback(request_rating, request_comments);
        }
        if self.no_csv {
            config = config.with_output_csv(false);
        }
        config
    }
}

fn resolve_user(user: &str) -> String {
    if user == "auto" {
        NotebookIdentity::new().resolve()
    } else {
        user.to_string()
    }
}

async fn replay(config: LoggerConfig, path: PathBuf) -> Result<()> {
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    let events = events::parse_events(&content)?;
    info!(path = %path.display(), events = events.len(), "Replaying event log");

    let logger = Arc::new(ChainLogger::new(config)?);

    // Feedback prompts block on the terminal
    let worker = Arc::clone(&logger);
    let replayed = tokio::task::spawn_blocking(move || {
        for event in &events {
            event.dispatch(worker.as_ref());
        }
        events.len()
    })
    .await?;

    println!("Replayed {} events", replayed);
    println!("Records logged: {}", logger.history().len());
    if let Some(target) = logger.target() {
        println!("All fields: {}", target.all_fields_path().display());
        println!("Subset of fields: {}", target.subset_path().display());
    }
    if logger.active_runs() > 0 {
        println!("Runs without an end event: {}", logger.active_runs());
    }

    let faults = logger.faults();
    println!("Faults: {}", faults.len());
    for fault in &faults {
        let run = fault.run_id.map(|id| id.to_string()).unwrap_or_default();
        println!("  [{}] {} {}", fault.kind, run, fault.message);
    }

    println!();
    print!("{}", logger.metrics().gather_text()?);
    Ok(())
}

fn show(path: PathBuf) -> Result<()> {
    let table = chainlog_store::read_table(&path)
        .with_context(|| format!("Failed to read store {}", path.display()))?;
    println!("{}", path.display());
    println!("Columns ({}): {}", table.headers.len(), table.headers.join(", "));
    println!("Rows: {}", table.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/chainlog/environment (if exists)
    chainlog_core::config::load_environment();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chainlog=info".parse()?)
                .add_directive("chainlog_tracker=info".parse()?)
                .add_directive("chainlog_store=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match &args.command {
        Commands::Replay { events } => replay(args.logger_config(), events.clone()).await,
        Commands::Whoami => {
            let user = match &args.user {
                Some(user) => resolve_user(user),
                None => NotebookIdentity::new().resolve(),
            };
            println!("{}", user);
            Ok(())
        }
        Commands::Show { file } => show(file.clone()),
    }
}
