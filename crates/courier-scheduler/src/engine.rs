//! Dispatch engine: wires the loops together and keeps them alive.
//!
//! ```text
//! DispatchEngine::run
//!   ├── supervise("queue-sync")  ── QueueSynchronizer::run
//!   └── supervise("directory")   ── DirectoryCache::run
//!                                      └── WorkerSpawner::spawn(channel)
//!                                            └── Dispatcher::run_channel
//! ```
//!
//! A loop that panics is logged and restarted after `restart_delay_ms`.
//! A channel worker that panics has its channel released and its in-flight
//! ids forgotten; the next directory refresh starts a new worker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_core::config::CourierConfig;
use courier_core::traits::{ChannelDirectory, DeliverySink, QueueSource, SendGateway};
use tokio::sync::Notify;

use crate::directory::DirectoryCache;
use crate::dispatch::{Dispatcher, WorkerSpawner};
use crate::executor::SendExecutor;
use crate::ledger::Ledger;
use crate::pacing::PacingPolicy;
use crate::retry::RetryController;
use crate::state::{SchedulerState, SharedState};
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::sync::QueueSynchronizer;

pub struct DispatchEngine {
    state: SharedState,
    ledger: Arc<Ledger>,
    stats: Arc<DispatchStats>,
    sync: Arc<QueueSynchronizer>,
    directory: Arc<DirectoryCache>,
    spawner: WorkerSpawner,
    restart_delay: Duration,
}

impl DispatchEngine {
    /// Build the engine. The ledger must already be loaded.
    pub fn new(
        config: CourierConfig,
        ledger: Arc<Ledger>,
        source: Arc<dyn QueueSource>,
        directory: Arc<dyn ChannelDirectory>,
        gateway: Arc<dyn SendGateway>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        let state = SchedulerState::shared(config.queue.poll_interval_min());
        let stats = Arc::new(DispatchStats::new());
        let wake = Arc::new(Notify::new());

        let executor = SendExecutor::new(
            gateway,
            sink,
            ledger.clone(),
            RetryController::new(&config.retry),
            state.clone(),
            wake.clone(),
            stats.clone(),
            config.send.timeout(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            state.clone(),
            PacingPolicy::new(config.pacing.clone()),
            executor,
            ledger.clone(),
            wake.clone(),
            stats.clone(),
            config.dispatch.idle_poll(),
        ));
        let sync = Arc::new(QueueSynchronizer::new(
            source,
            state.clone(),
            ledger.clone(),
            wake,
            stats.clone(),
            config.queue.clone(),
        ));
        let directory = Arc::new(DirectoryCache::new(
            directory,
            state.clone(),
            config.directory.open_status.clone(),
            config.directory.refresh_interval(),
        ));

        Self {
            spawner: WorkerSpawner::new(dispatcher, state.clone()),
            state,
            ledger,
            stats,
            sync,
            directory,
            restart_delay: config.dispatch.restart_delay(),
        }
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run every loop for the lifetime of the process.
    pub async fn run(&self) {
        tracing::info!(
            "🚀 Dispatch engine started ({} message(s) already delivered)",
            self.ledger.len()
        );

        let sync = self.sync.clone();
        let sync_loop = supervise("queue-sync", self.restart_delay, move || {
            let sync = sync.clone();
            async move { sync.run().await }
        });

        let directory = self.directory.clone();
        let spawner = self.spawner.clone();
        let directory_loop = supervise("directory", self.restart_delay, move || {
            let directory = directory.clone();
            let spawner = spawner.clone();
            async move { directory.run(move |name| spawner.spawn(name)).await }
        });

        tokio::join!(sync_loop, directory_loop);
    }
}

/// Run `make()` as a task, restarting it whenever it ends.
async fn supervise<F, Fut>(name: &'static str, restart_delay: Duration, make: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        match tokio::spawn(make()).await {
            Ok(()) => tracing::warn!("⚠️ {name} loop returned, restarting"),
            Err(e) if e.is_panic() => tracing::error!(
                "💥 {name} loop crashed, restarting in {}ms: {e}",
                restart_delay.as_millis()
            ),
            Err(_) => return,
        }
        tokio::time::sleep(restart_delay).await;
    }
}
