//! The resilient duplex relay between a conversational bot channel and an
//! external real-time message bus.
//!
//! The crate owns a single bus connection, keeps it alive with bounded
//! exponential backoff and a heartbeat, and multiplexes inbound-frame
//! delivery against the one stored conversation destination. Everything
//! external sits behind a trait seam: the bus behind
//! [`transport::BusConnector`], the bot channel behind
//! [`adapter::ConversationAdapter`].

pub mod activity;
pub mod adapter;
pub mod backoff;
pub mod conn;
pub mod destination;
pub mod error;
mod heartbeat;
pub mod normalize;
pub mod router;
pub mod session;
pub mod transport;

pub use conn::{ConnectionManager, ConnectionState};
pub use error::{ConnectError, DeliverError, SendError, SendOutcome, TransportError};
pub use router::DestinationRouter;
pub use session::{RelayHandle, RelaySession};
