use async_trait::async_trait;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

use ragbridge_core::error::{BridgeError, Result};

/// Outbound half of one client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<()>;
    async fn close(&self);
}

/// WebSocket transport: a bounded queue drained by the session's writer.
pub struct WsTransport {
    tx: mpsc::Sender<Message>,
    send_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl WsTransport {
    /// Returns the transport and a receiver that flips to `true` when the
    /// hub closes it.
    pub fn new(tx: mpsc::Sender<Message>, send_timeout: Duration) -> (Self, watch::Receiver<bool>) {
        let (closed, closed_rx) = watch::channel(false);
        (
            Self {
                tx,
                send_timeout,
                closed,
            },
            closed_rx,
        )
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, text: &str) -> Result<()> {
        if *self.closed.borrow() {
            return Err(BridgeError::SendFailure("connection closed".into()));
        }
        match timeout(self.send_timeout, self.tx.send(Message::Text(text.to_string()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BridgeError::SendFailure("outbound channel closed".into())),
            Err(_) => Err(BridgeError::SendFailure("outbound queue full".into())),
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        let _ = self.tx.try_send(Message::Close(None));
    }
}
