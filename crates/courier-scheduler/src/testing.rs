//! Scripted collaborators for scheduler tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::config::{CourierConfig, PacingConfig};
use courier_core::error::{CourierError, Result};
use courier_core::traits::{ChannelDirectory, DeliverySink, QueueSource, SendGateway};
use courier_core::types::{
    ChannelCredential, DeliveryReport, DirectoryEntry, Job, MessageId, QueueSnapshot, SendOutcome,
};
use serde_json::json;
use tokio::time::Instant;

use crate::ledger::LedgerBackend;

/// Deterministic pacing: typing 1s + 100ms/word, pace 2s, cooldown 2s.
pub fn fixed_pacing() -> PacingConfig {
    PacingConfig {
        max_messages_per_channel: 7,
        message_pace_min_ms: 2_000,
        message_pace_max_ms: 2_000,
        extended_pause_probability: 0.0,
        extended_pause_min_ms: 10_000,
        extended_pause_max_ms: 10_000,
        occasional_break_probability: 0.0,
        occasional_break_min_ms: 60_000,
        occasional_break_max_ms: 60_000,
        reading_min_ms: 1_000,
        reading_max_ms: 1_000,
        writing_min_ms: 0,
        writing_max_ms: 0,
        per_word_min_ms: 100,
        per_word_max_ms: 100,
    }
}

pub fn test_config() -> CourierConfig {
    let mut config = CourierConfig::default();
    config.pacing = fixed_pacing();
    config.retry.retry_delay_min_ms = 3_000;
    config.retry.retry_delay_max_ms = 3_000;
    config.send.timeout_ms = 30_000;
    config
}

pub fn record(id: MessageId, destination: &str, body: &str) -> serde_json::Value {
    json!({"id": id, "destination": destination, "body": body})
}

pub fn open(name: &str) -> DirectoryEntry {
    DirectoryEntry {
        name: name.into(),
        credential: format!("{name}-token"),
        connection_status: "open".into(),
    }
}

/// Poll until `check` holds or `limit` of (paused) time elapses.
pub async fn wait_for<F: Fn() -> bool>(check: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check()
}

// ─── Ledger ─────────────────────────────────────────────────

/// Loads empty and refuses every write.
pub struct FailingBackend;

impl LedgerBackend for FailingBackend {
    fn kind(&self) -> &'static str {
        "failing"
    }

    fn load(&mut self) -> Result<HashSet<MessageId>> {
        Ok(HashSet::new())
    }

    fn append(&mut self, _id: MessageId, _all: &HashSet<MessageId>) -> Result<()> {
        Err(CourierError::Ledger("disk full".into()))
    }
}

// ─── Queue Source ───────────────────────────────────────────

pub struct FakeQueue {
    listing: Mutex<std::result::Result<QueueSnapshot, String>>,
}

impl FakeQueue {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        let queue = Self {
            listing: Mutex::new(Ok(QueueSnapshot::Empty)),
        };
        queue.set(records);
        queue
    }

    pub fn set(&self, records: Vec<serde_json::Value>) {
        *self.listing.lock().unwrap() = Ok(QueueSnapshot::Records(records));
    }

    /// Answer with the "no records" indicator.
    pub fn report_none(&self) {
        *self.listing.lock().unwrap() = Ok(QueueSnapshot::Empty);
    }

    pub fn fail(&self, reason: &str) {
        *self.listing.lock().unwrap() = Err(reason.to_string());
    }
}

#[async_trait]
impl QueueSource for FakeQueue {
    fn name(&self) -> &str {
        "fake-queue"
    }

    async fn fetch(&self) -> Result<QueueSnapshot> {
        self.listing
            .lock()
            .unwrap()
            .clone()
            .map_err(CourierError::SourceUnavailable)
    }
}

// ─── Channel Directory ──────────────────────────────────────

pub struct FakeDirectory {
    entries: Mutex<Option<Vec<DirectoryEntry>>>,
}

impl FakeDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries: Mutex::new(Some(entries)),
        }
    }

    pub fn set(&self, entries: Vec<DirectoryEntry>) {
        *self.entries.lock().unwrap() = Some(entries);
    }

    pub fn fail(&self) {
        *self.entries.lock().unwrap() = None;
    }
}

#[async_trait]
impl ChannelDirectory for FakeDirectory {
    fn name(&self) -> &str {
        "fake-directory"
    }

    async fn fetch(&self) -> Result<Vec<DirectoryEntry>> {
        self.entries
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CourierError::SourceUnavailable("directory down".into()))
    }
}

// ─── Send Gateway ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(u16),
    /// Never answers; only the executor timeout ends the call.
    Hang,
}

#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub channel: String,
    pub message_id: MessageId,
    pub started: Instant,
}

/// Replays scripted steps in order, then answers 200.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<GatewayCall>>,
    active: Mutex<HashSet<String>>,
    overlap: AtomicBool,
    latency: Duration,
}

impl ScriptedGateway {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
            active: Mutex::new(HashSet::new()),
            overlap: AtomicBool::new(false),
            latency: Duration::from_millis(200),
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: MessageId) -> usize {
        self.calls().iter().filter(|c| c.message_id == id).count()
    }

    /// Whether two sends ever ran at once on the same channel.
    pub fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a> {
    active: &'a Mutex<HashSet<String>>,
    channel: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.channel);
    }
}

#[async_trait]
impl SendGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, channel: &ChannelCredential, job: &Job) -> SendOutcome {
        self.calls.lock().unwrap().push(GatewayCall {
            channel: channel.name.clone(),
            message_id: job.id,
            started: Instant::now(),
        });
        if !self.active.lock().unwrap().insert(channel.name.clone()) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        let _guard = ActiveGuard {
            active: &self.active,
            channel: channel.name.clone(),
        };

        let step = self.script.lock().unwrap().pop_front();
        tokio::time::sleep(self.latency).await;
        match step.unwrap_or(Step::Status(200)) {
            Step::Status(code) => SendOutcome::from_status(code, format!("scripted {code}")),
            Step::Hang => {
                std::future::pending::<()>().await;
                SendOutcome::Transient {
                    reason: "unreachable".into(),
                }
            }
        }
    }
}

// ─── Delivery Sink ──────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<DeliveryReport>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn reports(&self) -> Vec<DeliveryReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn reports_for(&self, id: MessageId) -> Vec<DeliveryReport> {
        self.reports()
            .into_iter()
            .filter(|r| r.message_id == id)
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn confirm(&self, report: &DeliveryReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::Sink("sink offline".into()));
        }
        Ok(())
    }
}
