//! Transport abstraction traits for Huddle.
//!
//! A connection's socket is split into a [`FrameReader`] owned by the read
//! pump and a [`FrameWriter`] owned by the write pump, so the pumps never
//! share the socket and never need a lock around it.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// A transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// UTF-8 data frame (JSON).
    Text(String),
    /// Binary data frame (MessagePack).
    Binary(Bytes),
    /// Keepalive probe.
    Ping(Bytes),
    /// Keepalive answer.
    Pong(Bytes),
    /// Closing handshake.
    Close,
}

impl WireFrame {
    /// Size of the frame's data in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the frame carries application data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A read or write deadline elapsed.
    #[error("Connection timed out")]
    Timeout,

    /// Inbound frame exceeds the configured limit.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] huddle_protocol::ProtocolError),
}

/// Receiving half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame.
    ///
    /// Returns `None` once the peer has gone away cleanly.
    async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError>;
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one frame.
    async fn send(&mut self, frame: WireFrame) -> Result<(), TransportError>;

    /// Send a close frame.
    async fn close(&mut self) -> Result<(), TransportError> {
        self.send(WireFrame::Close).await
    }
}
