//! Client-facing transports: WebSocket sessions and the command endpoint.

pub mod commands;
pub mod ws;
