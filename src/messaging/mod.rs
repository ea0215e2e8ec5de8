//! Acknowledged messaging on top of a fire-and-forget, origin-checked send primitive.
//!
//! A [messaging::Messaging] context connects to peers with a retried handshake and sends data
//!  messages that each resolve with the peer's confirmation or time out. Listeners receive the
//!  data and send the confirmations.

pub mod agent;
pub mod config;
pub mod confirmation;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod ids;
pub mod listener;
pub mod messaging;
pub mod pending;
pub mod transport;
