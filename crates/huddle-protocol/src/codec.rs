//! Codec for encoding and decoding Huddle messages.
//!
//! Text frames carry JSON and binary frames carry MessagePack with named
//! fields. Each websocket frame holds exactly one message, so no length
//! prefix is needed.

use bytes::Bytes;
use thiserror::Error;

use crate::message::Message;

/// Maximum encoded message size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Serialization used for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// JSON, sent as websocket text frames.
    #[default]
    Json,
    /// MessagePack, sent as websocket binary frames.
    MessagePack,
}

impl Encoding {
    /// Parse an encoding name as given by clients (`json`, `msgpack`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Encoding::Json),
            "msgpack" | "messagepack" => Some(Encoding::MessagePack),
            _ => None,
        }
    }

    /// Whether frames of this encoding are sent as text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Encoding::Json)
    }
}

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Empty frame.
    #[error("Empty frame")]
    Empty,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a message.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode(message: &Message, encoding: Encoding) -> Result<Bytes, ProtocolError> {
    let data = match encoding {
        Encoding::Json => serde_json::to_vec(message)?,
        Encoding::MessagePack => rmp_serde::to_vec_named(message)?,
    };

    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(Bytes::from(data))
}

/// Decode a message.
///
/// # Errors
///
/// Returns an error if the data is empty, too large, or malformed.
pub fn decode(data: &[u8], encoding: Encoding) -> Result<Message, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let message = match encoding {
        Encoding::Json => serde_json::from_slice(data)?,
        Encoding::MessagePack => rmp_serde::from_slice(data)?,
    };
    Ok(message)
}
