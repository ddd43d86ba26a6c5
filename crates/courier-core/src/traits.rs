//! Collaborator traits: the remote services the scheduler talks to.
//!
//! The scheduler only depends on these; `courier-channels` provides the
//! HTTP implementations and tests plug in scripted fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChannelCredential, DeliveryReport, DirectoryEntry, Job, QueueSnapshot, SendOutcome};

/// Returns the jobs currently pending upstream.
#[async_trait]
pub trait QueueSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the full current listing.
    async fn fetch(&self) -> Result<QueueSnapshot>;
}

/// Returns the sending channels and their connection status.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch every known channel, connected or not.
    async fn fetch(&self) -> Result<Vec<DirectoryEntry>>;
}

/// Issues one send on behalf of a channel.
#[async_trait]
pub trait SendGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Send `job` as `channel`. Never fails outright: every failure mode is
    /// folded into a classified [`SendOutcome`].
    async fn send(&self, channel: &ChannelCredential, job: &Job) -> SendOutcome;
}

/// Accepts per-message outcome confirmations.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &str;

    async fn confirm(&self, report: &DeliveryReport) -> Result<()>;
}
