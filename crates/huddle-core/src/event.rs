//! Lifecycle events submitted to the hub event loop.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::room::{Room, RoomId};
use tokio::sync::oneshot;

/// Add a connection to the global and per-user sets.
#[derive(Debug)]
pub struct RegisterEvent {
    pub user_id: String,
    pub connection: ConnectionHandle,
    /// Signalled once the registration has been applied.
    pub ack: Option<oneshot::Sender<()>>,
}

/// Remove a connection everywhere and close its outbound queue.
#[derive(Debug, Clone)]
pub struct UnregisterEvent {
    pub user_id: String,
    pub connection_id: ConnectionId,
}

/// Insert a new room owned by `user_id`.
#[derive(Debug, Clone)]
pub struct CreateRoomEvent {
    pub user_id: String,
    pub room_id: RoomId,
    pub room: Room,
}

/// Add the connection of (`user_id`, `device_id`) to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRoomEvent {
    pub room_id: RoomId,
    pub user_id: String,
    pub device_id: String,
}

/// Remove the connection of (`user_id`, `device_id`) from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRoomEvent {
    pub room_id: RoomId,
    pub user_id: String,
    pub device_id: String,
}
