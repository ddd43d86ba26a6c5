//! Data model: jobs, directory entries and send outcomes.

use serde::{Deserialize, Serialize};

/// Externally assigned message identifier, used as the idempotency key.
pub type MessageId = u64;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: MessageId,
    /// Recipient address (opaque).
    pub destination: String,
    /// Message text.
    pub body: String,
    /// Incremented on each retryable failure.
    pub attempt_count: u32,
    pub state: JobState,
}

impl Job {
    pub fn new(id: MessageId, destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            destination: destination.into(),
            body: body.into(),
            attempt_count: 0,
            state: JobState::Pending,
        }
    }

    /// Move the job to `next`. Returns false (and leaves the state alone)
    /// for transitions the lifecycle does not allow; terminal states are sticky.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

/// Job lifecycle.
///
/// `Pending → Claimed → Sending → {Sent | FailedPermanent | FailedRetryable}`,
/// `FailedRetryable → {Pending | FailedExhausted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Claimed,
    Sending,
    Sent,
    FailedPermanent,
    FailedRetryable,
    FailedExhausted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Sent | JobState::FailedPermanent | JobState::FailedExhausted
        )
    }

    pub fn can_advance_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (*self, next),
            (Pending, Claimed)
                | (Claimed, Sending)
                | (Sending, Sent)
                | (Sending, FailedPermanent)
                | (Sending, FailedRetryable)
                | (FailedRetryable, Pending)
                | (FailedRetryable, FailedExhausted)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Claimed => "claimed",
            JobState::Sending => "sending",
            JobState::Sent => "sent",
            JobState::FailedPermanent => "failed_permanent",
            JobState::FailedRetryable => "failed_retryable",
            JobState::FailedExhausted => "failed_exhausted",
        };
        write!(f, "{s}")
    }
}

/// What the Queue Source returned on one fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueSnapshot {
    /// Source explicitly reported that nothing is queued.
    Empty,
    /// Raw records, validated by the synchronizer.
    Records(Vec<serde_json::Value>),
}

/// One entry of the Channel Directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(alias = "token", default)]
    pub credential: String,
    #[serde(rename = "connectionStatus", alias = "connection_status", default)]
    pub connection_status: String,
}

/// What a send call needs to authenticate as a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredential {
    pub name: String,
    pub credential: String,
}

/// Classified result of one send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx.
    Delivered { status: u16 },
    /// Client error about the message itself, never retried.
    Rejected { status: u16, reason: String },
    /// Timeout, rate limit, 5xx, connection failure.
    Transient { reason: String },
}

impl SendOutcome {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            200..=299 => SendOutcome::Delivered { status },
            // Request timeout and rate limiting are about the channel, not the message.
            408 | 429 => SendOutcome::Transient {
                reason: format!("HTTP {status}: {}", body.into()),
            },
            400..=499 => SendOutcome::Rejected {
                status,
                reason: body.into(),
            },
            _ => SendOutcome::Transient {
                reason: format!("HTTP {status}: {}", body.into()),
            },
        }
    }
}

/// Outcome code reported to the Delivery Sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCode {
    Delivered,
    Failed,
}

impl OutcomeCode {
    pub fn code(&self) -> u8 {
        match self {
            OutcomeCode::Delivered => 1,
            OutcomeCode::Failed => 2,
        }
    }
}

impl Serialize for OutcomeCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Confirmation sent to the Delivery Sink for a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub message_id: MessageId,
    pub channel_name: String,
    pub outcome_code: OutcomeCode,
}
