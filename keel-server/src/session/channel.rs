//! Control channel abstraction
//!
//! A session talks to its peer through [`ControlChannel`] rather than a
//! concrete socket. The WebSocket adapter lives in `api::control`; tests use
//! an in-memory pair.

use async_trait::async_trait;
use thiserror::Error;

/// One inbound unit read from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong or any other keepalive; carries no command
    Heartbeat,
}

/// The connection failed underneath the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Duplex, message-oriented connection to one client
#[async_trait]
pub trait ControlChannel: Send + 'static {
    /// Waits for the next frame; `None` once the peer has closed
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Writes one text message
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Releases the connection; must tolerate an already-closed peer
    async fn close(&mut self);
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use keel_core::codec;
    use keel_core::dto::message::ServerMessage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Server half of an in-memory channel
    pub struct MemoryChannel {
        inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
        outbound: mpsc::UnboundedSender<String>,
        closes: Arc<AtomicUsize>,
    }

    /// Client half: push frames in, read server messages out
    pub struct Peer {
        inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
        outbound: mpsc::UnboundedReceiver<String>,
        closes: Arc<AtomicUsize>,
    }

    pub fn pair() -> (MemoryChannel, Peer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));

        (
            MemoryChannel {
                inbound: in_rx,
                outbound: out_tx,
                closes: closes.clone(),
            },
            Peer {
                inbound: Some(in_tx),
                outbound: out_rx,
                closes,
            },
        )
    }

    #[async_trait]
    impl ControlChannel for MemoryChannel {
        async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
            self.inbound.recv().await
        }

        async fn send(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound
                .send(text)
                .map_err(|_| TransportError::new("peer went away"))
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inbound.close();
        }
    }

    impl Peer {
        pub fn send_text(&self, text: &str) {
            self.push(Ok(Frame::Text(text.to_string())));
        }

        pub fn send_frame(&self, frame: Frame) {
            self.push(Ok(frame));
        }

        pub fn fail(&self, message: &str) {
            self.push(Err(TransportError::new(message)));
        }

        /// Closes the client side, as a peer sending a close frame would
        pub fn hang_up(&mut self) {
            self.inbound = None;
        }

        /// Stops accepting server writes; later sends fail
        pub fn stop_reading(&mut self) {
            self.outbound.close();
        }

        /// Next message written by the server, or `None` once it is gone
        pub async fn next_message(&mut self) -> Option<ServerMessage> {
            let text = self.outbound.recv().await?;
            Some(codec::decode_message(&text).expect("server wrote invalid json"))
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn push(&self, item: Result<Frame, TransportError>) {
            if let Some(tx) = &self.inbound {
                let _ = tx.send(item);
            }
        }
    }
}
