mod config;
mod jobs;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WorkerConfig;
use crate::jobs::{CronClient, Job};

#[derive(Parser)]
#[command(
    name = "wetime-worker",
    version,
    about = "Triggers WeTime feed refresh and reminder jobs on a schedule"
)]
struct Cli {
    /// Path to a TOML config file. WETIME_* environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run once and exit instead of scheduling
    #[arg(long)]
    once: bool,

    /// Only this job (default: both)
    #[arg(long, value_enum)]
    job: Option<Job>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wetime_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::load(cli.config.as_deref())?;
    let client = CronClient::new(&config)?;

    let jobs = match cli.job {
        Some(job) => vec![job],
        None => vec![Job::RefreshIcs, Job::SendReminders],
    };

    if cli.once {
        for job in jobs {
            client.trigger(job).await?;
        }
        return Ok(());
    }

    tracing::info!(backend = %config.backend_url, "wetime-worker v{} started", env!("CARGO_PKG_VERSION"));

    let refresh_every = config.refresh_every()?;
    let reminders_every = config.reminders_every()?;
    let runs = jobs.into_iter().map(|job| {
        let every = match job {
            Job::RefreshIcs => refresh_every,
            Job::SendReminders => reminders_every,
        };
        client.run_every(job, every)
    });

    tokio::select! {
        _ = futures::future::join_all(runs) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
