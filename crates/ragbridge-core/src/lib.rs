//! ragbridge core: transport-agnostic wire contracts and the shared error type.
//!
//! This crate defines the envelope carried inside broker records, the codecs
//! that move it on and off the wire (JSON frames for the broker, STOMP text
//! frames for WebSocket clients), and the error surface shared by the
//! gateway. It carries no broker or runtime dependencies so it can be reused
//! by producers that live outside the gateway process.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every malformed input surfaces as `BridgeError::MalformedFrame` so a bad
//! record can never take the consume loop down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{BridgeError, ClientCode, Result};
pub use protocol::Envelope;
