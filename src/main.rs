//! # Readiness Service Entry Point

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use readiness::{
    config::ConfigLoader,
    db::{init_pool, migrate},
    pipeline::PipelineScheduler,
    provider,
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[derive(Debug, Parser)]
#[command(name = "readiness", version, about = "Funding readiness engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations, then run the API and the pipeline scheduler (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run a single pipeline pass and exit
    RunOnce {
        /// Run only this business, bypassing eligibility checks
        #[arg(long)]
        business: Option<Uuid>,
    },
    /// Clear the manual-resync flag of a dead-lettered business
    Resync { business_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let config = Arc::new(config);
    let db = init_pool(&config).await?;

    let provider = provider::from_config(&config.provider)?;
    let scheduler = PipelineScheduler::new(db.clone(), Arc::clone(&config), provider);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            migrate(&db).await?;

            let shutdown = CancellationToken::new();
            let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown.child_token()));

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutdown requested");
                signal_token.cancel();
            });

            let state = AppState {
                config,
                db,
                scheduler,
            };
            let served = run_server(state, shutdown.clone()).await;
            shutdown.cancel();
            scheduler_task.await?;
            served?;
        }
        Command::Migrate => {
            migrate(&db).await?;
        }
        Command::RunOnce { business } => match business {
            Some(business_id) => {
                let report = scheduler.run_pass(business_id, Utc::now()).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            None => {
                let stats = scheduler.tick(Utc::now()).await?;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        },
        Command::Resync { business_id } => {
            let state = scheduler.resync(business_id, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}
