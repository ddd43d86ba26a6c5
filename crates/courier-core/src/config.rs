//! Courier configuration system.
//!
//! Every numeric pacing constant lives here rather than in code, so the
//! historical cadence variants are just different config files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CourierError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub send: SendConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl CourierConfig {
    /// Load config from the default path (~/.courier/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CourierError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CourierError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Courier home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".courier")
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let q = &self.queue;
        check_range("queue.poll_interval", q.poll_interval_min_ms, q.poll_interval_max_ms)?;
        if q.poll_interval_min_ms == 0 {
            return Err(CourierError::Config(
                "queue.poll_interval_min_ms must be greater than zero".into(),
            ));
        }
        check_factor("queue.poll_growth_factor", q.poll_growth_factor)?;
        check_factor("queue.empty_growth_factor", q.empty_growth_factor)?;

        if self.directory.refresh_interval_ms == 0 {
            return Err(CourierError::Config(
                "directory.refresh_interval_ms must be greater than zero".into(),
            ));
        }
        for (key, ms) in [
            ("queue.timeout_ms", self.queue.timeout_ms),
            ("directory.timeout_ms", self.directory.timeout_ms),
            ("sink.timeout_ms", self.sink.timeout_ms),
        ] {
            if ms == 0 {
                return Err(CourierError::Config(format!("{key} must be greater than zero")));
            }
        }
        if self.send.timeout_ms == 0 {
            return Err(CourierError::Config("send.timeout_ms must be greater than zero".into()));
        }

        let p = &self.pacing;
        if p.max_messages_per_channel == 0 {
            return Err(CourierError::Config(
                "pacing.max_messages_per_channel must be at least 1".into(),
            ));
        }
        check_range("pacing.message_pace", p.message_pace_min_ms, p.message_pace_max_ms)?;
        check_range("pacing.extended_pause", p.extended_pause_min_ms, p.extended_pause_max_ms)?;
        check_range(
            "pacing.occasional_break",
            p.occasional_break_min_ms,
            p.occasional_break_max_ms,
        )?;
        check_range("pacing.reading", p.reading_min_ms, p.reading_max_ms)?;
        check_range("pacing.writing", p.writing_min_ms, p.writing_max_ms)?;
        check_range("pacing.per_word", p.per_word_min_ms, p.per_word_max_ms)?;
        check_probability("pacing.extended_pause_probability", p.extended_pause_probability)?;
        check_probability(
            "pacing.occasional_break_probability",
            p.occasional_break_probability,
        )?;

        let r = &self.retry;
        if r.max_retries == 0 {
            return Err(CourierError::Config("retry.max_retries must be at least 1".into()));
        }
        check_range("retry.retry_delay", r.retry_delay_min_ms, r.retry_delay_max_ms)?;

        if self.dispatch.idle_poll_ms == 0 {
            return Err(CourierError::Config(
                "dispatch.idle_poll_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, min: u64, max: u64) -> Result<()> {
    if min > max {
        return Err(CourierError::Config(format!(
            "{name}: min ({min}) is greater than max ({max})"
        )));
    }
    Ok(())
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(CourierError::Config(format!(
            "{name} must be within [0, 1], got {p}"
        )));
    }
    Ok(())
}

fn check_factor(name: &str, f: f64) -> Result<()> {
    if !f.is_finite() || f < 1.0 {
        return Err(CourierError::Config(format!("{name} must be >= 1.0, got {f}")));
    }
    Ok(())
}

/// Record field names in the Queue Source payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFields {
    #[serde(default = "default_id_field")]
    pub id: String,
    #[serde(default = "default_destination_field")]
    pub destination: String,
    #[serde(default = "default_body_field")]
    pub body: String,
}

fn default_id_field() -> String { "id".into() }
fn default_destination_field() -> String { "destination".into() }
fn default_body_field() -> String { "body".into() }

impl Default for QueueFields {
    fn default() -> Self {
        Self {
            id: default_id_field(),
            destination: default_destination_field(),
            body: default_body_field(),
        }
    }
}

/// Queue Source polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_url")]
    pub url: String,
    /// Text inside a `{"message": ...}` reply that means "nothing queued".
    #[serde(default = "default_empty_marker")]
    pub empty_marker: String,
    #[serde(default = "default_poll_min")]
    pub poll_interval_min_ms: u64,
    #[serde(default = "default_poll_max")]
    pub poll_interval_max_ms: u64,
    /// Growth when records came back but none were new.
    #[serde(default = "default_poll_growth")]
    pub poll_growth_factor: f64,
    /// Growth when the source reported no records at all.
    #[serde(default = "default_empty_growth")]
    pub empty_growth_factor: f64,
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_ms: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_queue_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub fields: QueueFields,
}

fn default_queue_url() -> String { "http://localhost:5000/api/queue".into() }
fn default_empty_marker() -> String { "No hay registros".into() }
fn default_poll_min() -> u64 { 3_000 }
fn default_poll_max() -> u64 { 15_000 }
fn default_poll_growth() -> f64 { 1.2 }
fn default_empty_growth() -> f64 { 1.5 }
fn default_recovery_interval() -> u64 { 10_000 }
fn default_queue_timeout() -> u64 { 30_000 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            empty_marker: default_empty_marker(),
            poll_interval_min_ms: default_poll_min(),
            poll_interval_max_ms: default_poll_max(),
            poll_growth_factor: default_poll_growth(),
            empty_growth_factor: default_empty_growth(),
            recovery_interval_ms: default_recovery_interval(),
            timeout_ms: default_queue_timeout(),
            fields: QueueFields::default(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval_min(&self) -> Duration { Duration::from_millis(self.poll_interval_min_ms) }
    pub fn poll_interval_max(&self) -> Duration { Duration::from_millis(self.poll_interval_max_ms) }
    pub fn recovery_interval(&self) -> Duration { Duration::from_millis(self.recovery_interval_ms) }
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Channel Directory polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub url: String,
    /// Sent in `auth_header` when set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_directory_timeout")]
    pub timeout_ms: u64,
    /// `connectionStatus` value that marks a usable channel.
    #[serde(default = "default_open_status")]
    pub open_status: String,
}

fn default_directory_url() -> String { "http://localhost:5000/api/instances".into() }
fn default_refresh_interval() -> u64 { 8_000 }
fn default_directory_timeout() -> u64 { 15_000 }
fn default_open_status() -> String { "open".into() }

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            api_key: None,
            auth_header: default_auth_header(),
            refresh_interval_ms: default_refresh_interval(),
            timeout_ms: default_directory_timeout(),
            open_status: default_open_status(),
        }
    }
}

impl DirectoryConfig {
    pub fn refresh_interval(&self) -> Duration { Duration::from_millis(self.refresh_interval_ms) }
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Per-channel send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    /// The channel name is appended to this URL.
    #[serde(default = "default_send_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    #[serde(default = "default_send_timeout")]
    pub timeout_ms: u64,
}

fn default_send_base_url() -> String { "http://localhost:8080/message/sendText/".into() }
fn default_auth_header() -> String { "apikey".into() }
fn default_send_timeout() -> u64 { 30_000 }

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            base_url: default_send_base_url(),
            auth_header: default_auth_header(),
            timeout_ms: default_send_timeout(),
        }
    }
}

impl SendConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Delivery Sink endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_url")]
    pub url: String,
    #[serde(default = "default_sink_timeout")]
    pub timeout_ms: u64,
}

fn default_sink_url() -> String { "http://localhost:5000/api/confirm".into() }
fn default_sink_timeout() -> u64 { 10_000 }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
            timeout_ms: default_sink_timeout(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Per-channel pacing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Sends before a channel must cool down.
    #[serde(default = "default_max_messages")]
    pub max_messages_per_channel: u32,
    #[serde(default = "default_pace_min")]
    pub message_pace_min_ms: u64,
    #[serde(default = "default_pace_max")]
    pub message_pace_max_ms: u64,
    #[serde(default = "default_extended_probability")]
    pub extended_pause_probability: f64,
    #[serde(default = "default_extended_min")]
    pub extended_pause_min_ms: u64,
    #[serde(default = "default_extended_max")]
    pub extended_pause_max_ms: u64,
    #[serde(default = "default_break_probability")]
    pub occasional_break_probability: f64,
    #[serde(default = "default_break_min")]
    pub occasional_break_min_ms: u64,
    #[serde(default = "default_break_max")]
    pub occasional_break_max_ms: u64,
    #[serde(default = "default_reading_min")]
    pub reading_min_ms: u64,
    #[serde(default = "default_reading_max")]
    pub reading_max_ms: u64,
    #[serde(default = "default_writing_min")]
    pub writing_min_ms: u64,
    #[serde(default = "default_writing_max")]
    pub writing_max_ms: u64,
    #[serde(default = "default_per_word_min")]
    pub per_word_min_ms: u64,
    #[serde(default = "default_per_word_max")]
    pub per_word_max_ms: u64,
}

fn default_max_messages() -> u32 { 7 }
fn default_pace_min() -> u64 { 2_000 }
fn default_pace_max() -> u64 { 5_000 }
fn default_extended_probability() -> f64 { 0.2 }
fn default_extended_min() -> u64 { 8_000 }
fn default_extended_max() -> u64 { 20_000 }
fn default_break_probability() -> f64 { 0.05 }
fn default_break_min() -> u64 { 20_000 }
fn default_break_max() -> u64 { 60_000 }
fn default_reading_min() -> u64 { 1_000 }
fn default_reading_max() -> u64 { 2_000 }
fn default_writing_min() -> u64 { 1_500 }
fn default_writing_max() -> u64 { 3_000 }
fn default_per_word_min() -> u64 { 50 }
fn default_per_word_max() -> u64 { 100 }

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_messages_per_channel: default_max_messages(),
            message_pace_min_ms: default_pace_min(),
            message_pace_max_ms: default_pace_max(),
            extended_pause_probability: default_extended_probability(),
            extended_pause_min_ms: default_extended_min(),
            extended_pause_max_ms: default_extended_max(),
            occasional_break_probability: default_break_probability(),
            occasional_break_min_ms: default_break_min(),
            occasional_break_max_ms: default_break_max(),
            reading_min_ms: default_reading_min(),
            reading_max_ms: default_reading_max(),
            writing_min_ms: default_writing_min(),
            writing_max_ms: default_writing_max(),
            per_word_min_ms: default_per_word_min(),
            per_word_max_ms: default_per_word_max(),
        }
    }
}

/// Retry policy for transient send failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total send attempts allowed per job.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_min")]
    pub retry_delay_min_ms: u64,
    #[serde(default = "default_retry_max")]
    pub retry_delay_max_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_retry_min() -> u64 { 3_000 }
fn default_retry_max() -> u64 { 8_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_min_ms: default_retry_min(),
            retry_delay_max_ms: default_retry_max(),
        }
    }
}

/// Where delivered message ids are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackendKind,
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackendKind {
    /// Flat JSON array of ids, rewritten on every append.
    #[default]
    Json,
    /// One row per id in a SQLite table.
    Sqlite,
}

fn default_ledger_path() -> String { "~/.courier/sent_messages.json".into() }

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackendKind::default(),
            path: default_ledger_path(),
        }
    }
}

/// Channel worker behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How often an idle channel re-checks the pending set.
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,
    /// Delay before a crashed loop is restarted.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
}

fn default_idle_poll() -> u64 { 500 }
fn default_restart_delay() -> u64 { 1_000 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

impl DispatchConfig {
    pub fn idle_poll(&self) -> Duration { Duration::from_millis(self.idle_poll_ms) }
    pub fn restart_delay(&self) -> Duration { Duration::from_millis(self.restart_delay_ms) }
}
