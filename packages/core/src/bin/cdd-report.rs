//! CDD Reporting CLI
//!
//! Runs geography sync and completion reports against the configured stores
//! and prints the result as JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! # Mirror every relational level into the document store
//! cdd-report sync-geography
//!
//! # Completion for a locality, with the agents working there
//! cdd-report locality commune 12 --facilitators --role FC
//!
//! # Completion per department for one phase
//! cdd-report workflow phase 3
//!
//! # Deployment diagnostics
//! cdd-report diagnostics
//! ```
//!
//! # Environment Variables
//!
//! - `CDD_CONFIG`: TOML config file (same as `--config`)
//! - `CDD_*`: field overrides, see `cdd_core::config`
//! - `RUST_LOG`: Logging level (default: "info")

use anyhow::{Context, Result};
use cdd_core::services::{FacilitatorImportRow, Page, ReportScope, TaskFilter};
use cdd_core::{CddConfig, CddRuntime, FacilitatorRole};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cdd-report")]
#[command(about = "CDD geography sync and completion reports", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "CDD_CONFIG")]
    config: Option<PathBuf>,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, default_value_t = false)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or refresh the mirror of every administrative level
    SyncGeography,
    /// Completion of a département, commune, arrondissement or village
    Locality {
        level_type: String,
        id: String,
        /// Also list the facilitators assigned to the locality
        #[arg(long, default_value_t = false)]
        facilitators: bool,
        /// Restrict the facilitator listing to one role
        #[arg(long)]
        role: Option<String>,
    },
    /// Completion per department of a phase, activity or task
    Workflow { kind: String, id: String },
    /// Completion buckets and monthly activity of deployed facilitators
    Diagnostics,
    /// Enroll facilitators from a JSON array of import rows
    Enroll { file: PathBuf },
    /// Ordered task list and per-level completion of one facilitator
    Tasks {
        username: String,
        #[arg(long)]
        village: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        activity: Option<String>,
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[arg(long, default_value_t = 50)]
        offset: usize,
    },
}

#[derive(Serialize)]
struct TasksOutput {
    listing: cdd_core::services::TaskListing,
    completion: cdd_core::services::TaskCompletionBreakdown,
}

#[derive(Serialize)]
struct LocalityOutput {
    report: cdd_core::services::CompletionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    facilitators: Option<Vec<cdd_core::services::FacilitatorSummary>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = CddConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let runtime = CddRuntime::open(config)
        .await
        .context("Failed to open stores")?;

    let output = match cli.command {
        Commands::SyncGeography => {
            let summary = runtime.mirror_sync.sync_all(&runtime.relational).await?;
            serde_json::to_value(summary)?
        }
        Commands::Locality {
            level_type,
            id,
            facilitators,
            role,
        } => {
            let scope = ReportScope::parse(&level_type, &id)?;
            let ReportScope::Locality {
                level_type,
                administrative_id,
            } = &scope
            else {
                anyhow::bail!("'{}' is not a locality type", level_type);
            };

            let report = runtime.aggregator.report(&scope).await?;
            let facilitators = if facilitators {
                let role = role
                    .as_deref()
                    .map(str::parse::<FacilitatorRole>)
                    .transpose()?;
                Some(
                    runtime
                        .facilitators
                        .facilitators_in_locality(*level_type, administrative_id, role)
                        .await?,
                )
            } else {
                None
            };
            serde_json::to_value(LocalityOutput {
                report,
                facilitators,
            })?
        }
        Commands::Workflow { kind, id } => {
            let scope = ReportScope::parse(&kind, &id)?;
            if !matches!(scope, ReportScope::Workflow { .. }) {
                anyhow::bail!("'{}' is not a workflow kind", kind);
            }
            serde_json::to_value(runtime.aggregator.report(&scope).await?)?
        }
        Commands::Diagnostics => {
            serde_json::to_value(runtime.facilitators.completion_distribution().await?)?
        }
        Commands::Enroll { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let rows: Vec<FacilitatorImportRow> =
                serde_json::from_str(&content).context("Failed to parse import rows")?;
            serde_json::to_value(runtime.facilitators.enroll_all(&rows).await?)?
        }
        Commands::Tasks {
            username,
            village,
            phase,
            activity,
            index,
            offset,
        } => {
            let facilitator = runtime
                .relational
                .get_facilitator_by_username(&username)
                .await?
                .with_context(|| format!("Unknown facilitator '{}'", username))?;
            let filter = TaskFilter {
                administrative_level_id: village,
                phase_name: phase,
                activity_name: activity,
                task_name: None,
            };
            let ordering = runtime.tasks.ordering_for(&facilitator).await?;
            let listing = runtime
                .tasks
                .list_tasks(&facilitator, &filter, &ordering, Page::new(index, offset))
                .await?;
            let completion = runtime
                .tasks
                .completion_by_level(&facilitator, &filter)
                .await?;
            serde_json::to_value(TasksOutput {
                listing,
                completion,
            })?
        }
    };

    let rendered = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
