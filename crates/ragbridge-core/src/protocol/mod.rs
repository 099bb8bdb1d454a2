//! Protocol modules (broker frames + client STOMP frames).
//!
//! - `envelope`: the command/headers/body unit every codec produces.
//! - `frame`: JSON encoding carried in broker record values.
//! - `stomp`: STOMP text frames exchanged with WebSocket clients.
//!
//! All decoders are panic-free: malformed input is reported as
//! `BridgeError::MalformedFrame`.

pub mod envelope;
pub mod frame;
pub mod stomp;

pub use envelope::Envelope;
