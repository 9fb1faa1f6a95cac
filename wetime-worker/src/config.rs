use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

fn default_backend_url() -> String {
    "http://127.0.0.1:4096".to_string()
}

fn default_refresh_interval() -> String {
    "15m".to_string()
}

fn default_reminder_interval() -> String {
    "1m".to_string()
}

fn default_request_timeout() -> String {
    "2m".to_string()
}

/// Worker configuration, from an optional TOML file and `WETIME_*` variables.
/// The token is shared with the server (`WETIME_INTERNAL_CRON_TOKEN`).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    pub internal_cron_token: Option<String>,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,

    #[serde(default = "default_reminder_interval")]
    pub reminder_interval: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl WorkerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }

        let config: WorkerConfig = builder
            .add_source(Environment::with_prefix("WETIME").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn token(&self) -> Result<&str> {
        self.internal_cron_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("internal_cron_token is not configured")
    }

    pub fn refresh_every(&self) -> Result<Duration> {
        parse_interval("refresh_interval", &self.refresh_interval)
    }

    pub fn reminders_every(&self) -> Result<Duration> {
        parse_interval("reminder_interval", &self.reminder_interval)
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_interval("request_timeout", &self.request_timeout)
    }
}

fn parse_interval(name: &str, value: &str) -> Result<Duration> {
    let duration =
        humantime::parse_duration(value).with_context(|| format!("Invalid {name} '{value}'"))?;
    anyhow::ensure!(!duration.is_zero(), "{name} must be greater than zero");
    Ok(duration)
}
