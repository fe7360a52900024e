//! Bidirectional message transport owned by a session.
//!
//! [`Transport`] is the seam between the session receive loop and the
//! concrete connection. [`WsTransport`] adapts an axum WebSocket. Framing
//! beyond "one discrete message" is left to the connection itself.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};

use crate::error::GatewayError;

/// One discrete message on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
    /// Keep-alive traffic (ping/pong).
    Control,
    /// The peer asked to close the connection.
    Close,
}

/// Send/receive abstraction over the underlying connection.
///
/// `recv` yields `None` once the connection is gone without error,
/// `Some(Err(_))` on a transport failure.
#[async_trait]
pub trait Transport: Send {
    /// Waits for the next frame.
    async fn recv(&mut self) -> Option<Result<Frame, GatewayError>>;

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the frame cannot be written.
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError>;

    /// Closes the connection. Errors are ignored: the peer may be gone.
    async fn close(&mut self);
}

/// [`Transport`] over an upgraded axum WebSocket.
#[derive(Debug)]
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wraps an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Frame, GatewayError>> {
        let message = match self.socket.recv().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(GatewayError::Transport(e.to_string()))),
        };
        let frame = match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
            Message::Close(_) => Frame::Close,
        };
        Some(Ok(frame))
    }

    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError> {
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(data) => Message::binary(data),
            Frame::Control => Message::Ping(Vec::new().into()),
            Frame::Close => Message::Close(None),
        };
        self.socket
            .send(message)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            tracing::trace!(error = %e, "close frame not delivered");
        }
    }
}
