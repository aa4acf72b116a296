//! Hub errors.

use thiserror::Error;

/// Errors produced by the hub, its registry, and outbound queues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// No live connection for the (user, device) pair.
    #[error("Connection not found: user {user_id}, device {device_id}")]
    ConnectionNotFound { user_id: String, device_id: String },

    /// Room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room password did not match.
    #[error("Wrong password for room: {0}")]
    WrongPassword(String),

    /// Outbound queue is at capacity; the message was dropped.
    #[error("Outbound queue full")]
    QueueFull,

    /// Outbound queue was closed by teardown.
    #[error("Outbound queue closed")]
    QueueClosed,

    /// Identity triple is incomplete.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// Room name failed validation.
    #[error("Invalid room name: {0}")]
    InvalidRoomName(&'static str),

    /// The hub event channel is full.
    #[error("Hub busy")]
    HubBusy,

    /// The hub event loop is no longer running.
    #[error("Hub closed")]
    HubClosed,
}
