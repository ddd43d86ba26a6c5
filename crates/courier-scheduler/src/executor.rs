//! Send Executor: one send attempt, classified and accounted for.
//!
//! ```text
//!            ┌── Delivered ──► ledger ──► sink(1) ──► Sent
//! send ──────┼── Rejected ───────────────► sink(2) ──► FailedPermanent
//!  (timeout) └── Transient ──► retry ──┬─► backoff ──► Pending
//!                                      └─► sink(2) ──► FailedExhausted
//! ```

use std::sync::Arc;
use std::time::Duration;

use courier_core::error::CourierError;
use courier_core::traits::{DeliverySink, SendGateway};
use courier_core::types::{ChannelCredential, DeliveryReport, Job, JobState, OutcomeCode, SendOutcome};
use tokio::sync::Notify;

use crate::ledger::Ledger;
use crate::retry::{RetryController, RetryDecision, schedule_requeue};
use crate::state::{Claim, SharedState};
use crate::stats::DispatchStats;

/// What became of a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Sent,
    Rejected,
    /// Handed back to the pending set after `delay`.
    Retrying { delay: Duration },
    Exhausted { attempts: u32 },
}

impl Disposition {
    /// Whether the channel owes a pacing delay before its next claim.
    pub fn paces_channel(&self) -> bool {
        matches!(self, Disposition::Sent | Disposition::Rejected)
    }
}

pub struct SendExecutor {
    gateway: Arc<dyn SendGateway>,
    sink: Arc<dyn DeliverySink>,
    ledger: Arc<Ledger>,
    retry: RetryController,
    state: SharedState,
    wake: Arc<Notify>,
    stats: Arc<DispatchStats>,
    timeout: Duration,
}

impl SendExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn SendGateway>,
        sink: Arc<dyn DeliverySink>,
        ledger: Arc<Ledger>,
        retry: RetryController,
        state: SharedState,
        wake: Arc<Notify>,
        stats: Arc<DispatchStats>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            sink,
            ledger,
            retry,
            state,
            wake,
            stats,
            timeout,
        }
    }

    /// Send a claimed job and settle its outcome.
    pub async fn execute(&self, claim: Claim) -> Disposition {
        let Claim { mut job, channel } = claim;
        job.advance(JobState::Sending);

        let outcome = match tokio::time::timeout(self.timeout, self.gateway.send(&channel, &job)).await {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::Transient {
                reason: format!("no response within {}ms", self.timeout.as_millis()),
            },
        };

        match outcome {
            SendOutcome::Delivered { status } => self.on_delivered(job, &channel, status).await,
            SendOutcome::Rejected { status, reason } => {
                let err = CourierError::PermanentSend {
                    status,
                    message: reason,
                };
                self.on_rejected(job, &channel, err).await
            }
            SendOutcome::Transient { reason } => self.on_transient(job, &channel, reason).await,
        }
    }

    async fn on_delivered(&self, mut job: Job, channel: &ChannelCredential, status: u16) -> Disposition {
        if let Err(e) = self.ledger.record(job.id) {
            self.stats.record_ledger_error();
            tracing::error!(
                "❌ Message {} delivered but not persisted, a restart may resend it: {e}",
                job.id
            );
        }
        self.report(job.id, channel, OutcomeCode::Delivered).await;
        job.advance(JobState::Sent);
        {
            let mut st = self.state.lock().await;
            st.record_success(&channel.name);
            st.finish(job.id, job.state);
        }
        self.stats.record_sent();
        tracing::info!(
            "✅ Message {} sent via {} (HTTP {status}) to {}",
            job.id,
            channel.name,
            job.destination
        );
        Disposition::Sent
    }

    async fn on_rejected(&self, mut job: Job, channel: &ChannelCredential, err: CourierError) -> Disposition {
        self.report(job.id, channel, OutcomeCode::Failed).await;
        job.advance(JobState::FailedPermanent);
        self.state.lock().await.finish(job.id, job.state);
        self.stats.record_rejected();
        tracing::warn!("🚫 Message {} failed permanently via {}: {err}", job.id, channel.name);
        Disposition::Rejected
    }

    async fn on_transient(&self, mut job: Job, channel: &ChannelCredential, reason: String) -> Disposition {
        job.advance(JobState::FailedRetryable);
        let err = CourierError::TransientSend(reason);

        match self.retry.on_transient(&mut job) {
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    "⚠️ Message {} attempt {}/{} via {}: {err}; retrying in {}ms",
                    job.id,
                    job.attempt_count,
                    self.retry.max_retries(),
                    channel.name,
                    delay.as_millis()
                );
                self.state.lock().await.mark_backoff(job.id);
                self.stats.record_retried();
                schedule_requeue(self.state.clone(), self.wake.clone(), job, delay);
                Disposition::Retrying { delay }
            }
            RetryDecision::Exhausted => {
                let attempts = job.attempt_count;
                let exhausted = CourierError::RetryExhausted {
                    attempts,
                    last_error: err.to_string(),
                };
                self.report(job.id, channel, OutcomeCode::Failed).await;
                self.state.lock().await.finish(job.id, job.state);
                self.stats.record_exhausted();
                tracing::warn!("🛑 Message {} via {}: {exhausted}", job.id, channel.name);
                Disposition::Exhausted { attempts }
            }
        }
    }

    /// Best-effort confirmation; failures are logged and counted only.
    async fn report(&self, message_id: u64, channel: &ChannelCredential, outcome_code: OutcomeCode) {
        let report = DeliveryReport {
            message_id,
            channel_name: channel.name.clone(),
            outcome_code,
        };
        if let Err(e) = self.sink.confirm(&report).await {
            self.stats.record_sink_error();
            tracing::warn!(
                "⚠️ Delivery confirmation for message {message_id} via {} failed: {e}",
                self.sink.name()
            );
        }
    }
}
