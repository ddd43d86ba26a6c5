//! # Courier Scheduler
//!
//! Paced dispatch of queued outbound messages over a pool of sending
//! channels, with at-most-once delivery accounting across restarts.
//!
//! ## Architecture
//! ```text
//! QueueSynchronizer ──► pending set ──► Dispatcher (one task per channel)
//!        ▲                  ▲                 │  typing delay, pacing, cooldown
//!        │                  │                 ▼
//!   QueueSource       RetryController ◄── SendExecutor ──► Ledger
//!                      (backoff)              │
//! DirectoryCache ──► channel table            └──► DeliverySink
//! ```
//!
//! All shared mutable state lives in one [`state::SchedulerState`] behind a
//! tokio mutex; the ledger is loaded fully before the engine starts.

pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod pacing;
pub mod retry;
pub mod state;
pub mod stats;
pub mod sync;

#[cfg(test)]
mod testing;

pub use engine::DispatchEngine;
pub use executor::{Disposition, SendExecutor};
pub use ledger::{JsonFileBackend, Ledger, LedgerBackend, SqliteBackend};
pub use pacing::{Cooldown, CooldownKind, PacingPolicy};
pub use retry::{RetryController, RetryDecision};
pub use state::{SchedulerState, SharedState};
pub use stats::{DispatchStats, StatsSnapshot};
pub use sync::{PollOutcome, QueueSynchronizer, TickReport};
