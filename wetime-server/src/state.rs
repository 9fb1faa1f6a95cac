use std::sync::Arc;

use anyhow::Result;
use wetime_core::WeTimeConfig;
use wetime_core::reminders::{LogNotifier, ReminderNotifier};
use wetime_core::store::{MemoryStore, Store};
use wetime_core::sync::{FeedFetcher, HttpFeedFetcher};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub fetcher: Arc<dyn FeedFetcher>,
    pub notifier: Arc<dyn ReminderNotifier>,
    pub config: Arc<WeTimeConfig>,
}

impl AppState {
    /// Open the snapshot store and HTTP fetcher described by `config`.
    pub async fn new(config: WeTimeConfig) -> Result<Self> {
        let store = MemoryStore::open(&config.data_path()?).await?;
        let fetcher = HttpFeedFetcher::new(config.feed_timeout()?)?;

        Ok(AppState {
            store: Arc::new(store),
            fetcher: Arc::new(fetcher),
            notifier: Arc::new(LogNotifier),
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}
