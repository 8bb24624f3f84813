//! Control API Handler
//!
//! Upgrades `GET /ws` to a WebSocket and hands the socket to the session
//! supervisor.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};

use crate::session::{ControlChannel, Frame, SessionSupervisor, TransportError};

#[derive(Debug, Clone)]
pub struct ControlState {
    pub supervisor: Arc<SessionSupervisor>,
    pub max_message_bytes: usize,
}

/// GET /ws
pub async fn control_socket(State(state): State<ControlState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| async move {
            state.supervisor.spawn(WsChannel::new(socket));
        })
}

/// [`ControlChannel`] over an axum WebSocket
pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ControlChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        let frame = match self.socket.recv().await? {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Frame::Heartbeat,
            Ok(Message::Close(_)) => return None,
            Err(e) => return Some(Err(TransportError::new(e.to_string()))),
        };
        Some(Ok(frame))
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::new(e.to_string()))
    }

    async fn close(&mut self) {
        // Fails harmlessly when the peer already closed
        let _ = self.socket.send(Message::Close(None)).await;
    }
}
