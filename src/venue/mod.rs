//! Venue protocol client
//!
//! One duplex WebSocket connection to the trading venue. Outbound envelopes
//! carry an auto-incrementing `req_id`; inbound envelopes are discriminated
//! by their `msg_type` tag.

pub mod session;
pub mod types;

pub use session::{SessionConfig, SessionHandle};
pub use types::{InboundMessage, OutboundRequest};

/// Transport/protocol failure taxonomy
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("malformed frame: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Events delivered from the session task to the engine.
///
/// Custom transports feed these through
/// [`crate::engine::EngineHandle::feed_venue_event`].
#[derive(Debug, Clone)]
pub enum VenueEvent {
    /// Socket established; authorization is in flight
    Connected,
    /// Socket closed (remote close, stream error or shutdown)
    Disconnected,
    /// Parsed inbound frame
    Frame(InboundMessage),
    /// Transport-level failure
    TransportError(String),
}
