//! WebSocket control client
//!
//! Sends commands and reads the server's acks and events. Acks arrive in
//! command order; events may be interleaved between them and are buffered
//! while [`ControlClient::command`] waits for an ack.

use std::collections::VecDeque;

use futures::{SinkExt, StreamExt};
use keel_core::codec;
use keel_core::dto::command::Command;
use keel_core::dto::message::{Outcome, PipelineEvent, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{ClientError, Result};

pub struct ControlClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: VecDeque<PipelineEvent>,
}

impl ControlClient {
    /// Connects to a control endpoint such as `ws://localhost:8080/ws`
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url).await?;
        tracing::debug!("Connected to {}", url);

        Ok(Self {
            socket,
            events: VecDeque::new(),
        })
    }

    /// Sends a command without waiting for its ack
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        let text = codec::encode_command(command)
            .map_err(|e| ClientError::Protocol(format!("failed to encode command: {}", e)))?;
        self.send_raw(text).await
    }

    /// Sends arbitrary text, which the server may reject
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.socket.send(Message::text(text)).await?;
        Ok(())
    }

    /// Sends a command and waits for its ack
    ///
    /// Events received meanwhile are kept for [`ControlClient::next_event`].
    pub async fn command(&mut self, command: &Command) -> Result<Outcome> {
        self.send_command(command).await?;
        self.next_reply().await
    }

    /// Waits for the next ack, buffering events
    ///
    /// A rejection of the message being acknowledged is returned as
    /// [`ClientError::Rejected`].
    pub async fn next_reply(&mut self) -> Result<Outcome> {
        loop {
            match self.read_message().await? {
                Some(ServerMessage::Ack { outcome, .. }) => return Ok(outcome),
                Some(ServerMessage::Rejected { error, .. }) => {
                    return Err(ClientError::Rejected(error));
                }
                Some(ServerMessage::Event { event, .. }) => self.events.push_back(event),
                None => return Err(ClientError::ConnectionClosed),
            }
        }
    }

    /// Next event, buffered or read from the connection
    ///
    /// Acks and rejections read while waiting are discarded. Returns `None`
    /// once the server closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<PipelineEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }

        loop {
            match self.read_message().await? {
                Some(ServerMessage::Event { event, .. }) => return Ok(Some(event)),
                Some(other) => tracing::debug!("Skipping non-event message: {:?}", other),
                None => return Ok(None),
            }
        }
    }

    /// Next raw server message, bypassing the event buffer
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        self.read_message().await
    }

    /// Closes the connection
    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(frame) = self.socket.next().await {
            match frame? {
                Message::Text(text) => {
                    return codec::decode_message(text.as_str())
                        .map(Some)
                        .map_err(|e| ClientError::Protocol(e.to_string()));
                }
                Message::Binary(_) => {
                    return Err(ClientError::Protocol("unexpected binary message".into()));
                }
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("buffered_events", &self.events.len())
            .finish_non_exhaustive()
    }
}
