//! Queue Synchronizer: mirrors the Queue Source into the pending set.
//!
//! Each tick:
//! 1. fetch the full listing (failure → recovery interval, state untouched)
//! 2. validate records, dropping malformed ones
//! 3. enqueue ids that are neither delivered nor already tracked
//! 4. cancel pending jobs the listing no longer contains
//! 5. adapt the poll interval
//!
//! ```text
//! new jobs      ──► interval = min
//! nothing new   ──► interval × poll_growth_factor   (capped at max)
//! source empty  ──► interval × empty_growth_factor  (capped at max)
//! source error  ──► interval = recovery
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use courier_core::config::{QueueConfig, QueueFields};
use courier_core::error::{CourierError, Result};
use courier_core::traits::QueueSource;
use courier_core::types::{Job, MessageId, QueueSnapshot};
use serde_json::Value;
use tokio::sync::Notify;

use crate::ledger::Ledger;
use crate::state::SharedState;
use crate::stats::DispatchStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    NewJobs,
    NothingNew,
    SourceEmpty,
    SourceError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: PollOutcome,
    pub listed: usize,
    pub enqueued: usize,
    pub already_delivered: usize,
    pub invalid: usize,
    pub canceled: Vec<MessageId>,
    pub next_interval: Duration,
}

/// Interval to wait before the next poll.
pub fn next_interval(current: Duration, outcome: PollOutcome, config: &QueueConfig) -> Duration {
    let grow = |factor: f64| {
        let ms = (current.as_millis() as f64 * factor).round() as u64;
        Duration::from_millis(ms).min(config.poll_interval_max())
    };
    match outcome {
        PollOutcome::NewJobs => config.poll_interval_min(),
        PollOutcome::NothingNew => grow(config.poll_growth_factor),
        PollOutcome::SourceEmpty => grow(config.empty_growth_factor),
        PollOutcome::SourceError => config.recovery_interval(),
    }
}

/// Turn a raw queue record into a job.
///
/// The id may be a non-negative integer or a string holding one; destination
/// and body must be non-empty strings. Unknown fields are ignored.
pub fn validate_record(record: &Value, fields: &QueueFields) -> Result<Job> {
    let id = match record.get(&fields.id) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| CourierError::Validation(format!("missing or non-numeric '{}'", fields.id)))?;

    let text = |name: &str| -> Result<String> {
        match record.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(CourierError::Validation(format!(
                "message {id}: missing or empty '{name}'"
            ))),
        }
    };

    Ok(Job::new(id, text(&fields.destination)?, text(&fields.body)?))
}

pub struct QueueSynchronizer {
    source: Arc<dyn QueueSource>,
    state: SharedState,
    ledger: Arc<Ledger>,
    wake: Arc<Notify>,
    stats: Arc<DispatchStats>,
    config: QueueConfig,
}

impl QueueSynchronizer {
    pub fn new(
        source: Arc<dyn QueueSource>,
        state: SharedState,
        ledger: Arc<Ledger>,
        wake: Arc<Notify>,
        stats: Arc<DispatchStats>,
        config: QueueConfig,
    ) -> Self {
        Self {
            source,
            state,
            ledger,
            wake,
            stats,
            config,
        }
    }

    /// One poll of the Queue Source.
    pub async fn tick(&self) -> TickReport {
        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let mut st = self.state.lock().await;
                let next = next_interval(st.poll.current_interval, PollOutcome::SourceError, &self.config);
                st.poll.current_interval = next;
                tracing::warn!("⚠️ Queue source {} unavailable: {e}", self.source.name());
                return TickReport {
                    outcome: PollOutcome::SourceError,
                    listed: 0,
                    enqueued: 0,
                    already_delivered: 0,
                    invalid: 0,
                    canceled: Vec::new(),
                    next_interval: next,
                };
            }
        };

        let (records, source_empty) = match snapshot {
            QueueSnapshot::Empty => (Vec::new(), true),
            QueueSnapshot::Records(records) => (records, false),
        };

        let mut jobs = Vec::with_capacity(records.len());
        let mut invalid = 0;
        for record in &records {
            match validate_record(record, &self.config.fields) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    invalid += 1;
                    tracing::warn!("⚠️ Dropping queue record: {e}");
                }
            }
        }
        let listed: HashSet<MessageId> = jobs.iter().map(|j| j.id).collect();

        let mut enqueued = 0;
        let mut already_delivered = 0;
        let (canceled, outcome, next_interval) = {
            let mut st = self.state.lock().await;
            for job in jobs {
                if self.ledger.contains(job.id) {
                    already_delivered += 1;
                    continue;
                }
                if st.enqueue(job) {
                    enqueued += 1;
                }
            }
            let canceled = st.cancel_missing(&listed);
            st.poll.remote_valid_ids = listed;

            let outcome = if enqueued > 0 {
                PollOutcome::NewJobs
            } else if source_empty {
                PollOutcome::SourceEmpty
            } else {
                PollOutcome::NothingNew
            };
            let next = next_interval(st.poll.current_interval, outcome, &self.config);
            st.poll.current_interval = next;
            (canceled, outcome, next)
        };

        if enqueued > 0 {
            self.wake.notify_waiters();
        }
        self.stats.add_enqueued(enqueued as u64);
        self.stats.add_canceled(canceled.len() as u64);
        self.stats.add_invalid(invalid as u64);

        TickReport {
            outcome,
            listed: records.len(),
            enqueued,
            already_delivered,
            invalid,
            canceled,
            next_interval,
        }
    }

    /// Poll forever on the adaptive interval.
    pub async fn run(&self) {
        tracing::info!(
            "📥 Queue sync started ({}, {}–{}ms)",
            self.source.name(),
            self.config.poll_interval_min_ms,
            self.config.poll_interval_max_ms
        );
        loop {
            let report = self.tick().await;
            if report.outcome != PollOutcome::SourceError {
                let (pending, in_flight) = {
                    let st = self.state.lock().await;
                    (st.pending_len(), st.in_flight_len())
                };
                tracing::info!(
                    "📥 Queue: {} listed, {} new, {} canceled, {} invalid | {} pending, {} in flight | next poll in {}ms",
                    report.listed,
                    report.enqueued,
                    report.canceled.len(),
                    report.invalid,
                    pending,
                    in_flight,
                    report.next_interval.as_millis()
                );
                tracing::debug!("📊 {:?}", self.stats.snapshot());
            }
            tokio::time::sleep(report.next_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SchedulerState;
    use crate::testing::{FakeQueue, record};
    use serde_json::json;

    struct Rig {
        sync: QueueSynchronizer,
        queue: Arc<FakeQueue>,
        state: SharedState,
        ledger: Arc<Ledger>,
    }

    fn rig(records: Vec<Value>) -> Rig {
        let config = QueueConfig::default();
        let queue = Arc::new(FakeQueue::new(records));
        let state = SchedulerState::shared(config.poll_interval_min());
        let ledger = Arc::new(Ledger::in_memory());
        let sync = QueueSynchronizer::new(
            queue.clone(),
            state.clone(),
            ledger.clone(),
            Arc::new(Notify::new()),
            Arc::new(DispatchStats::new()),
            config,
        );
        Rig {
            sync,
            queue,
            state,
            ledger,
        }
    }

    #[test]
    fn test_validate_record() {
        let fields = QueueFields::default();
        let job = validate_record(&record(1, "555", "hi"), &fields).unwrap();
        assert_eq!((job.id, job.destination.as_str(), job.body.as_str()), (1, "555", "hi"));

        let numeric_string = json!({"id": "42", "destination": "555", "body": "hi", "extra": true});
        assert_eq!(validate_record(&numeric_string, &fields).unwrap().id, 42);

        for bad in [
            json!({"destination": "555", "body": "hi"}),
            json!({"id": "abc", "destination": "555", "body": "hi"}),
            json!({"id": -1, "destination": "555", "body": "hi"}),
            json!({"id": 1.5, "destination": "555", "body": "hi"}),
            json!({"id": 1, "destination": 555, "body": "hi"}),
            json!({"id": 1, "destination": "555", "body": ""}),
        ] {
            assert!(matches!(
                validate_record(&bad, &fields),
                Err(CourierError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_validate_with_mapped_fields() {
        let fields = QueueFields {
            id: "idSendmessage".into(),
            destination: "tenvio".into(),
            body: "mensaje".into(),
        };
        let raw = json!({"idSendmessage": 9, "tenvio": "5491100", "mensaje": "hola"});
        let job = validate_record(&raw, &fields).unwrap();
        assert_eq!(job.id, 9);
        assert_eq!(job.destination, "5491100");
    }

    #[test]
    fn test_next_interval_policy() {
        let config = QueueConfig::default();
        let min = config.poll_interval_min();
        assert_eq!(next_interval(Duration::from_secs(9), PollOutcome::NewJobs, &config), min);
        assert_eq!(
            next_interval(min, PollOutcome::NothingNew, &config),
            Duration::from_millis(3_600)
        );
        assert_eq!(
            next_interval(min, PollOutcome::SourceEmpty, &config),
            Duration::from_millis(4_500)
        );
        assert_eq!(
            next_interval(Duration::from_secs(14), PollOutcome::SourceEmpty, &config),
            Duration::from_secs(15)
        );
        assert_eq!(
            next_interval(min, PollOutcome::SourceError, &config),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_tick_enqueues_and_dedupes() {
        let rig = rig(vec![
            record(1, "555", "hi"),
            record(2, "556", "hola"),
            json!({"id": 3}),
        ]);
        rig.ledger.record(2).unwrap();

        let report = rig.sync.tick().await;
        assert_eq!(report.outcome, PollOutcome::NewJobs);
        assert_eq!(report.enqueued, 1);
        assert_eq!(report.already_delivered, 1);
        assert_eq!(report.invalid, 1);
        assert_eq!(rig.state.lock().await.pending_ids(), vec![1]);

        // repeated listing adds nothing and backs off
        let again = rig.sync.tick().await;
        assert_eq!(again.outcome, PollOutcome::NothingNew);
        assert_eq!(again.enqueued, 0);
        assert_eq!(again.next_interval, Duration::from_millis(3_600));
        assert_eq!(rig.state.lock().await.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_tick_cancels_unlisted_pending_jobs() {
        let rig = rig(vec![record(1, "555", "a"), record(2, "555", "b")]);
        rig.sync.tick().await;

        rig.queue.set(vec![record(2, "555", "b")]);
        let report = rig.sync.tick().await;
        assert_eq!(report.canceled, vec![1]);
        assert_eq!(rig.state.lock().await.pending_ids(), vec![2]);

        rig.queue.report_none();
        let report = rig.sync.tick().await;
        assert_eq!(report.outcome, PollOutcome::SourceEmpty);
        assert_eq!(report.canceled, vec![2]);
        assert_eq!(rig.state.lock().await.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_empty_listing_grows_like_nothing_new() {
        let rig = rig(vec![record(1, "555", "a")]);
        rig.sync.tick().await;

        rig.queue.set(vec![]);
        let report = rig.sync.tick().await;
        assert_eq!(report.outcome, PollOutcome::NothingNew);
        assert_eq!(report.canceled, vec![1]);
        assert_eq!(report.next_interval, Duration::from_millis(3_600));

        rig.queue.report_none();
        let report = rig.sync.tick().await;
        assert_eq!(report.outcome, PollOutcome::SourceEmpty);
        assert_eq!(report.next_interval, Duration::from_millis(5_400));
    }

    #[tokio::test]
    async fn test_source_error_leaves_state_untouched() {
        let rig = rig(vec![record(1, "555", "a")]);
        rig.sync.tick().await;

        rig.queue.fail("connection refused");
        let report = rig.sync.tick().await;
        assert_eq!(report.outcome, PollOutcome::SourceError);
        assert_eq!(report.next_interval, Duration::from_secs(10));
        let st = rig.state.lock().await;
        assert_eq!(st.pending_ids(), vec![1]);
        assert!(st.poll.remote_valid_ids.contains(&1));
        assert_eq!(st.poll.current_interval, Duration::from_secs(10));
    }
}
