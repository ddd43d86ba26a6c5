//! # Courier Channels
//! HTTP implementations of the dispatcher's remote collaborators.
//!
//! - [`queue::HttpQueueSource`]: pending message listing
//! - [`directory::HttpChannelDirectory`]: connected sending channels
//! - [`gateway::HttpSendGateway`]: per-channel send endpoint
//! - [`sink::HttpDeliverySink`]: outcome confirmations

pub mod directory;
pub mod gateway;
pub mod queue;
pub mod sink;

pub use directory::HttpChannelDirectory;
pub use gateway::HttpSendGateway;
pub use queue::HttpQueueSource;
pub use sink::HttpDeliverySink;
