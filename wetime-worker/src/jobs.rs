//! The two scheduled jobs and the client that triggers them on the server.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tokio::time::MissedTickBehavior;

use wetime_core::constants::INTERNAL_TOKEN_HEADER;

use crate::config::WorkerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Job {
    /// Refresh every external calendar feed
    RefreshIcs,
    /// Deliver due event reminders
    SendReminders,
}

impl Job {
    pub fn name(self) -> &'static str {
        match self {
            Job::RefreshIcs => "refresh-ics",
            Job::SendReminders => "send-reminders",
        }
    }

    pub fn path(self) -> String {
        format!("/api/internal/cron/{}", self.name())
    }
}

/// Calls the internal cron endpoints with the shared token.
pub struct CronClient {
    client: reqwest::Client,
    backend_url: String,
    token: String,
}

impl CronClient {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout()?)
            .user_agent(concat!("wetime-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(CronClient {
            client,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            token: config.token()?.to_string(),
        })
    }

    /// Run `job` once and return the server's JSON summary.
    pub async fn trigger(&self, job: Job) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.backend_url, job.path());
        let response = self
            .client
            .post(&url)
            .header(INTERNAL_TOKEN_HEADER, &self.token)
            .send()
            .await
            .with_context(|| format!("{} request to {} failed", job.name(), url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("{} returned {}: {}", job.name(), status, body.trim());
        }

        let summary = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
        tracing::info!(job = job.name(), status = status.as_u16(), %summary, "Job finished");
        Ok(summary)
    }

    /// Trigger `job` every `every`, starting immediately. Failures are logged
    /// and the schedule continues. Ticks missed while a run is slow are dropped.
    pub async fn run_every(&self, job: Job, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(job = job.name(), every = %humantime::format_duration(every), "Scheduled job");

        loop {
            ticker.tick().await;
            if let Err(e) = self.trigger(job).await {
                tracing::warn!(job = job.name(), error = %format!("{e:#}"), "Job failed");
            }
        }
    }
}
