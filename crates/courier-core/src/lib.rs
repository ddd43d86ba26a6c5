//! # Courier Core
//!
//! Shared building blocks for the Courier dispatcher:
//! configuration, the error taxonomy, the job/channel data model and the
//! traits behind which the remote collaborators live.
//!
//! ```text
//! QueueSource ──► (scheduler) ──► SendGateway
//!                    │   ▲             │
//! ChannelDirectory ──┘   └── Ledger    └──► DeliverySink
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::CourierConfig;
pub use error::{CourierError, Result};
pub use traits::{ChannelDirectory, DeliverySink, QueueSource, SendGateway};
pub use types::{
    ChannelCredential, DeliveryReport, DirectoryEntry, Job, JobState, MessageId, OutcomeCode,
    QueueSnapshot, SendOutcome,
};
