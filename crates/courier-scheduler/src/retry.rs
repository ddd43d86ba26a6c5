//! Retry Controller: bounded, jittered retries for transient send failures.
//!
//! A retried job is not resent by the executor. It leaves its channel, waits
//! out a random backoff in its own task and is then put back into the
//! pending set, where it competes for a channel like any other job.

use std::sync::Arc;
use std::time::Duration;

use courier_core::config::RetryConfig;
use courier_core::types::{Job, JobState};
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`.
    Retry { delay: Duration },
    /// Attempt bound reached; the job is now `FailedExhausted`.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    max_retries: u32,
    delay_min_ms: u64,
    delay_max_ms: u64,
}

impl RetryController {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay_min_ms: config.retry_delay_min_ms,
            delay_max_ms: config.retry_delay_max_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Count a transient failure against `job` and decide what happens next.
    pub fn on_transient(&self, job: &mut Job) -> RetryDecision {
        self.on_transient_with(&mut rand::thread_rng(), job)
    }

    pub fn on_transient_with<R: Rng + ?Sized>(&self, rng: &mut R, job: &mut Job) -> RetryDecision {
        job.attempt_count = (job.attempt_count + 1).min(self.max_retries);
        if job.attempt_count < self.max_retries {
            RetryDecision::Retry {
                delay: self.backoff_with(rng),
            }
        } else {
            job.advance(JobState::FailedExhausted);
            RetryDecision::Exhausted
        }
    }

    pub fn backoff_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = if self.delay_min_ms >= self.delay_max_ms {
            self.delay_min_ms
        } else {
            rng.gen_range(self.delay_min_ms..=self.delay_max_ms)
        };
        Duration::from_millis(ms)
    }
}

/// Put `job` back into the pending set after `delay` and wake idle channels.
/// The caller must already have marked the id as in backoff.
pub fn schedule_requeue(
    state: SharedState,
    wake: Arc<Notify>,
    job: Job,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let id = job.id;
        let attempt = job.attempt_count;
        let requeued = state.lock().await.requeue(job);
        if requeued {
            tracing::info!("🔁 Message {id} requeued for attempt {}", attempt + 1);
            wake.notify_waiters();
        } else {
            tracing::info!("🗑️ Message {id} no longer listed upstream, dropped after backoff");
        }
    })
}
