//! ragbridge gateway library entry.
//!
//! Wires the broker ports, the consume loop, the command dispatcher, the
//! connection hub and the RAG handlers into one bridge, plus the HTTP/WS
//! surface in front of it. Used by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod broker;
pub mod collab;
pub mod config;
pub mod dispatch;
pub mod hub;
pub mod lifecycle;
pub mod obs;
pub mod ops;
pub mod rag;
pub mod router;
pub mod services;
pub mod transport;
