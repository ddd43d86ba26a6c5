//! Channel Directory Cache: keeps the channel table in step with the
//! remote directory on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier_core::error::Result;
use courier_core::traits::ChannelDirectory;

use crate::state::SharedState;

pub struct DirectoryCache {
    directory: Arc<dyn ChannelDirectory>,
    state: SharedState,
    open_status: String,
    interval: Duration,
    last_connected: AtomicUsize,
}

impl DirectoryCache {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        state: SharedState,
        open_status: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            state,
            open_status: open_status.into(),
            interval,
            last_connected: AtomicUsize::new(0),
        }
    }

    /// Fetch the directory and apply it. Returns the channels that need a
    /// worker. On fetch failure every channel is treated as unavailable for
    /// this cycle; counters are kept.
    pub async fn refresh(&self) -> Result<Vec<String>> {
        let entries = match self.directory.fetch().await {
            Ok(entries) => entries,
            Err(e) => {
                self.state.lock().await.disconnect_all();
                self.last_connected.store(0, Ordering::Relaxed);
                return Err(e);
            }
        };

        let (spawn, connected) = {
            let mut st = self.state.lock().await;
            let spawn = st.apply_directory(&entries, &self.open_status);
            (spawn, st.connected_names())
        };

        let previous = self.last_connected.swap(connected.len(), Ordering::Relaxed);
        if previous != connected.len() || !spawn.is_empty() {
            tracing::info!(
                "📇 {} channel(s) connected: [{}]",
                connected.len(),
                connected.join(", ")
            );
        }
        Ok(spawn)
    }

    /// Refresh forever, handing newly connected channels to `on_new`.
    pub async fn run<F>(&self, on_new: F)
    where
        F: Fn(String),
    {
        tracing::info!(
            "📇 Directory refresh started ({} every {}ms)",
            self.directory.name(),
            self.interval.as_millis()
        );
        loop {
            match self.refresh().await {
                Ok(spawn) => spawn.into_iter().for_each(&on_new),
                Err(e) => tracing::warn!("⚠️ Channel directory unavailable, pausing dispatch: {e}"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SchedulerState;
    use crate::testing::{FakeDirectory, open};
    use courier_core::types::DirectoryEntry;

    fn cache(directory: Arc<FakeDirectory>) -> (DirectoryCache, SharedState) {
        let state = SchedulerState::shared(Duration::from_secs(3));
        let cache = DirectoryCache::new(directory, state.clone(), "open", Duration::from_secs(8));
        (cache, state)
    }

    #[tokio::test]
    async fn test_refresh_filters_open_channels() {
        let closed = DirectoryEntry {
            connection_status: "close".into(),
            ..open("Avisos-02")
        };
        let directory = Arc::new(FakeDirectory::new(vec![open("Avisos-01"), closed]));
        let (cache, state) = cache(directory);

        let spawn = cache.refresh().await.unwrap();
        assert_eq!(spawn, vec!["Avisos-01".to_string()]);
        assert_eq!(state.lock().await.connected_names(), vec!["Avisos-01".to_string()]);

        // already has a worker
        assert!(cache.refresh().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_disconnects_but_keeps_counters() {
        let directory = Arc::new(FakeDirectory::new(vec![open("a")]));
        let (cache, state) = cache(directory.clone());
        cache.refresh().await.unwrap();
        state.lock().await.record_success("a");

        directory.fail();
        assert!(cache.refresh().await.is_err());
        {
            let st = state.lock().await;
            assert!(st.connected_names().is_empty());
            assert_eq!(st.channel("a").unwrap().sent_since_reset, 1);
        }

        directory.set(vec![open("a")]);
        cache.refresh().await.unwrap();
        assert_eq!(state.lock().await.connected_names(), vec!["a".to_string()]);
    }
}
