use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::loader::{self, Source};
use crate::metrics;
use crate::store::TableStore;

/// Loads the dataset into a [`TableStore`] and keeps it current.
pub struct Refresher {
    source: Source,
    fetch_timeout: Duration,
    store: Arc<TableStore>,
    published: watch::Sender<u64>,
}

impl Refresher {
    /// Performs the startup load. An error here means there is nothing to serve.
    pub async fn start(source: Source, fetch_timeout: Duration) -> Result<Self, LoadError> {
        let table = loader::load(&source, fetch_timeout).await?;
        info!(
            source = %source,
            rows = table.len(),
            sprints = metrics::sprints(&table).len(),
            "initial dataset loaded"
        );
        let store = Arc::new(TableStore::new(table));
        let (published, _) = watch::channel(store.get().version);
        Ok(Self {
            source,
            fetch_timeout,
            store,
            published,
        })
    }

    pub fn store(&self) -> Arc<TableStore> {
        Arc::clone(&self.store)
    }

    /// Receives the version of every table published after subscribing.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }

    /// Fetches and publishes a new table. On failure the current table stays.
    pub async fn refresh(&self) -> Result<u64, LoadError> {
        match loader::load(&self.source, self.fetch_timeout).await {
            Ok(table) => {
                let rows = table.len();
                let version = self.store.replace(table);
                info!(version, rows, "dataset refreshed");
                self.published.send_replace(version);
                Ok(version)
            }
            Err(e) => {
                let current = self.store.get();
                warn!(
                    version = current.version,
                    rows = current.table.len(),
                    "refresh failed, keeping previous dataset: {e}"
                );
                Err(e)
            }
        }
    }

    /// Refreshes every `period`, skipping the immediate first tick since
    /// `start` already loaded.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let _ = me.refresh().await;
            }
        })
    }
}
