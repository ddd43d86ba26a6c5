//! Dispatch Scheduler: one worker task per connected channel.
//!
//! ```text
//! loop:
//!   channel gone and idle? ──► exit
//!   sent_since_reset >= max? ──► cooldown, reset counter
//!   claim oldest pending job ──► none: park until woken or idle_poll
//!   already in ledger? ──► drop
//!   typing delay ──► execute ──► pace delay (sent / rejected) ──► release
//! ```
//!
//! A worker holds its channel `busy` from claim until release, so sends on
//! one channel never overlap. Sleeps only suspend the owning worker.

use std::sync::Arc;
use std::time::Duration;

use courier_core::types::JobState;
use tokio::sync::Notify;

use crate::executor::SendExecutor;
use crate::ledger::Ledger;
use crate::pacing::{CooldownKind, PacingPolicy};
use crate::state::{Claim, SharedState};
use crate::stats::DispatchStats;

pub struct Dispatcher {
    state: SharedState,
    pacing: PacingPolicy,
    executor: SendExecutor,
    ledger: Arc<Ledger>,
    wake: Arc<Notify>,
    stats: Arc<DispatchStats>,
    idle_poll: Duration,
}

impl Dispatcher {
    pub fn new(
        state: SharedState,
        pacing: PacingPolicy,
        executor: SendExecutor,
        ledger: Arc<Ledger>,
        wake: Arc<Notify>,
        stats: Arc<DispatchStats>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            state,
            pacing,
            executor,
            ledger,
            wake,
            stats,
            idle_poll,
        }
    }

    /// Claim/send/pace loop for one channel. Returns once the channel has
    /// left the directory and has nothing in flight.
    pub async fn run_channel(self: Arc<Self>, name: String) {
        tracing::info!("📡 Channel worker started: {name}");
        loop {
            let sent = {
                let mut st = self.state.lock().await;
                if st.retire_if_disconnected(&name) {
                    break;
                }
                st.channel(&name).map(|c| c.sent_since_reset).unwrap_or(0)
            };

            if self.pacing.needs_cooldown(sent) {
                self.cool_down(&name, sent).await;
                continue;
            }

            let claim = self.state.lock().await.claim(&name);
            let Some(claim) = claim else {
                let _ = tokio::time::timeout(self.idle_poll, self.wake.notified()).await;
                continue;
            };

            self.handle(&name, claim).await;
            self.state.lock().await.release(&name);
        }
        tracing::info!("👋 Channel worker stopped: {name} (disconnected)");
    }

    async fn cool_down(&self, name: &str, sent: u32) {
        let cooldown = self.pacing.cooldown();
        let label = match cooldown.kind {
            CooldownKind::OccasionalBreak => "occasional break",
            CooldownKind::ExtendedPause => "pause",
        };
        tracing::info!(
            "☕ {name} sent {sent} message(s), taking a {label} of {}s",
            cooldown.duration.as_secs()
        );
        tokio::time::sleep(cooldown.duration).await;
        self.state.lock().await.reset_counter(name);
    }

    async fn handle(&self, name: &str, claim: Claim) {
        let id = claim.job.id;
        if self.ledger.contains(id) {
            self.stats.record_skipped_delivered();
            self.state.lock().await.finish(id, JobState::Sent);
            tracing::info!("⏭️ Message {id} already delivered, skipped on {name}");
            return;
        }

        let typing = self.pacing.typing_delay(&claim.job.body);
        tracing::debug!("⌨️ {name} composing message {id} for {}ms", typing.as_millis());
        tokio::time::sleep(typing).await;

        let disposition = self.executor.execute(claim).await;
        if disposition.paces_channel() {
            let pace = self.pacing.pace_delay();
            tracing::debug!("⏳ {name} pacing {}ms after message {id}", pace.as_millis());
            tokio::time::sleep(pace).await;
        }
    }
}

/// Starts channel workers and cleans up after ones that panic.
#[derive(Clone)]
pub struct WorkerSpawner {
    dispatcher: Arc<Dispatcher>,
    state: SharedState,
}

impl WorkerSpawner {
    pub fn new(dispatcher: Arc<Dispatcher>, state: SharedState) -> Self {
        Self { dispatcher, state }
    }

    pub fn spawn(&self, name: String) {
        let worker = tokio::spawn(self.dispatcher.clone().run_channel(name.clone()));
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    let dropped = state.lock().await.recover_channel(&name);
                    tracing::error!(
                        "💥 Channel worker {name} crashed, released {} in-flight message(s): {e}",
                        dropped.len()
                    );
                }
            }
        });
    }
}
