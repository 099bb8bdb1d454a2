//! Shared error type across ragbridge crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Frame could not be decoded into an envelope.
    MalformedFrame,
    /// Envelope command has no registered handler.
    UnknownCommand,
    /// Broker could not be reached or refused the operation.
    BrokerUnavailable,
    /// A command handler failed while doing its work.
    HandlerFailure,
    /// Delivery to a single client connection failed.
    SendFailure,
    /// Invalid input or configuration.
    BadRequest,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::MalformedFrame => "MALFORMED_FRAME",
            ClientCode::UnknownCommand => "UNKNOWN_COMMAND",
            ClientCode::BrokerUnavailable => "BROKER_UNAVAILABLE",
            ClientCode::HandlerFailure => "HANDLER_FAILURE",
            ClientCode::SendFailure => "SEND_FAILURE",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("handler failure: {0}")]
    HandlerFailure(String),
    #[error("send failure: {0}")]
    SendFailure(String),
    #[error("scheduler handle is not set")]
    SchedulerUnset,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            BridgeError::MalformedFrame(_) => ClientCode::MalformedFrame,
            BridgeError::UnknownCommand(_) => ClientCode::UnknownCommand,
            BridgeError::BrokerUnavailable(_) => ClientCode::BrokerUnavailable,
            BridgeError::HandlerFailure(_) => ClientCode::HandlerFailure,
            BridgeError::SendFailure(_) => ClientCode::SendFailure,
            BridgeError::SchedulerUnset => ClientCode::Internal,
            BridgeError::BadRequest(_) => ClientCode::BadRequest,
            BridgeError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Message safe to show to connected clients.
    ///
    /// Input-level errors echo their detail; handler, broker and internal
    /// failures collapse to a generic sentence.
    pub fn public_message(&self) -> String {
        match self {
            BridgeError::MalformedFrame(detail) => format!("malformed frame: {detail}"),
            BridgeError::UnknownCommand(cmd) => format!("unknown command: {cmd}"),
            BridgeError::BadRequest(detail) => format!("bad request: {detail}"),
            BridgeError::BrokerUnavailable(_) => "message broker is unavailable".to_string(),
            BridgeError::HandlerFailure(_)
            | BridgeError::SendFailure(_)
            | BridgeError::SchedulerUnset
            | BridgeError::Internal(_) => "request could not be processed".to_string(),
        }
    }
}
