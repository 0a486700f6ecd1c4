//! Event bus client over Redis pub/sub.
//!
//! Each logical channel gets its own subscription connection, so a slow
//! consumer on one channel never stalls delivery on the other. Delivery is
//! at-most-once with no replay: a message published while no subscriber is
//! listening is lost. Per-channel publish order is preserved; nothing is
//! guaranteed across channels.

mod reconnect;
mod subscriber;

pub use reconnect::ReconnectDelay;
pub use subscriber::{ChannelSubscriber, MessageHandler};

/// Channel carrying raw session events, relayed verbatim to clients
pub const SESSION_CHANNEL: &str = "new-session";

/// Channel carrying JSON round events for the orchestrator
pub const ROUND_CHANNEL: &str = "new-round";
