//! Relay Gateway Library Crate
//!
//! This library contains the HTTP-facing half of the relay: configuration,
//! the bot-channel handlers, the negotiate client that mints bus access
//! URLs, and the conversation-continuation adapter. The `gateway` binary is
//! a thin wrapper around this library.

pub mod adapter;
pub mod config;
pub mod handlers;
pub mod negotiate;
pub mod router;
pub mod state;
