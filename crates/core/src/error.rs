//! Error taxonomy for the relay.
//!
//! None of these errors is fatal to the process: connect and transport
//! failures feed the reconnect cycle, send failures surface as an
//! observable [`SendOutcome::Dropped`], and delivery failures never touch
//! connection state.

use tokio_tungstenite::tungstenite;

/// A connection attempt against the message bus failed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Fetching a fresh client access credential failed.
    #[error("failed to fetch a client access token: {0}")]
    Token(#[source] anyhow::Error),
    /// The WebSocket handshake (or the request construction) failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    /// One of the identifying headers could not be encoded.
    #[error("invalid connection header {0}")]
    InvalidHeader(String),
    /// The retry ceiling was hit; the cooldown has already been served.
    /// The caller should simply retry on its next loop iteration.
    #[error("retry ceiling reached; circuit breaker cooldown served")]
    CircuitOpen,
}

/// An established connection failed while reading or writing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket transport error: {0}")]
    Ws(#[from] tungstenite::Error),
    /// The peer closed the connection.
    #[error("connection closed by the message bus")]
    Closed,
}

/// Why an outbound message was not delivered to the bus.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no open connection to the message bus")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("inline reconnect failed: {0}")]
    Reconnect(#[from] ConnectError),
}

/// The explicit result of a best-effort send: there is no outbound queue,
/// so a message that cannot be written after one inline reconnect is
/// dropped, and callers can observe the drop.
#[derive(Debug)]
pub enum SendOutcome {
    Delivered,
    Dropped(SendError),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Relaying an inbound message into the stored conversation failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliverError {
    /// Defensive only: the gateway seeds a bootstrap destination at
    /// startup, so this should be unreachable in a wired process.
    #[error("no conversation destination has been recorded")]
    NoDestination,
    /// The continuation capability rejected the activity. The connection
    /// to the bus is unaffected and the frame counts as processed.
    #[error("conversation adapter rejected the activity: {0}")]
    Adapter(#[source] anyhow::Error),
}
