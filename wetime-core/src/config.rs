//! Server configuration.
//!
//! Read from an optional TOML file, then `WETIME_`-prefixed environment
//! variables (`WETIME_BIND_ADDR`, `WETIME_INTERNAL_CRON_TOKEN`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::DEFAULT_FEED_TIMEOUT;
use crate::error::{WeTimeError, WeTimeResult};

static DEFAULT_BIND_ADDR: &str = "127.0.0.1:4096";

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_feed_timeout() -> String {
    humantime::format_duration(DEFAULT_FEED_TIMEOUT).to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeTimeConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON snapshot of the store. Defaults to `<data dir>/wetime/wetime.json`.
    pub data_file: Option<PathBuf>,

    /// Shared secret for the internal cron endpoints. They are disabled when unset.
    pub internal_cron_token: Option<String>,

    #[serde(default = "default_feed_timeout")]
    pub feed_timeout: String,
}

impl Default for WeTimeConfig {
    fn default() -> Self {
        WeTimeConfig {
            bind_addr: default_bind_addr(),
            data_file: None,
            internal_cron_token: None,
            feed_timeout: default_feed_timeout(),
        }
    }
}

impl WeTimeConfig {
    /// Load from `path` (if given and present) and the environment.
    pub fn load(path: Option<&Path>) -> WeTimeResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }

        builder
            .add_source(Environment::with_prefix("WETIME").try_parsing(true))
            .build()
            .map_err(|e| WeTimeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| WeTimeError::Config(e.to_string()))
    }

    pub fn data_path(&self) -> WeTimeResult<PathBuf> {
        match &self.data_file {
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
                Ok(PathBuf::from(expanded))
            }
            None => {
                let data_dir = dirs::data_dir().ok_or_else(|| {
                    WeTimeError::Config("Could not determine data directory".into())
                })?;
                Ok(data_dir.join("wetime").join("wetime.json"))
            }
        }
    }

    pub fn feed_timeout(&self) -> WeTimeResult<Duration> {
        humantime::parse_duration(&self.feed_timeout)
            .map_err(|e| WeTimeError::Config(format!("feed_timeout '{}': {}", self.feed_timeout, e)))
    }

    /// Exact comparison against the configured cron token.
    pub fn accepts_cron_token(&self, presented: Option<&str>) -> bool {
        match (&self.internal_cron_token, presented) {
            (Some(expected), Some(presented)) => !expected.is_empty() && expected == presented,
            _ => false,
        }
    }
}
