//! Rooms: named, optionally password-protected membership groups.

use crate::connection::ConnectionId;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;

/// Maximum room name length in characters.
pub const MAX_ROOM_NAME_LENGTH: usize = 128;

/// Format used for creation times in snapshots.
const CREATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A room identifier.
pub type RoomId = String;

/// Validate a room display name.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.chars().count() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Room name contains control characters");
    }
    Ok(())
}

/// A room owned by a user.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Plaintext password; empty means the room is open.
    pub password: String,
    pub owner_id: String,
    pub owner_name: String,
    pub created_at: DateTime<Local>,
    members: HashSet<ConnectionId>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(
        id: impl Into<RoomId>,
        name: impl Into<String>,
        password: impl Into<String>,
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            password: password.into(),
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
            created_at: Local::now(),
            members: HashSet::new(),
        }
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Check a join password. Open rooms admit any password.
    #[must_use]
    pub fn admits(&self, password: &str) -> bool {
        !self.has_password() || self.password == password
    }

    /// Add a member. Returns `true` if it was not already a member.
    pub fn add_member(&mut self, connection: ConnectionId) -> bool {
        self.members.insert(connection)
    }

    /// Remove a member. Returns `true` if it was a member.
    pub fn remove_member(&mut self, connection: ConnectionId) -> bool {
        self.members.remove(&connection)
    }

    #[must_use]
    pub fn is_member(&self, connection: ConnectionId) -> bool {
        self.members.contains(&connection)
    }

    #[must_use]
    pub fn members(&self) -> &HashSet<ConnectionId> {
        &self.members
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Listing snapshot of this room.
    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            has_password: self.has_password(),
            user_id: self.owner_id.clone(),
            user_name: self.owner_name.clone(),
            count: self.member_count(),
            create_time: self.created_at.format(CREATE_TIME_FORMAT).to_string(),
        }
    }
}

/// Room listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub has_password: bool,
    /// Owner user id.
    pub user_id: String,
    /// Owner display name.
    pub user_name: String,
    /// Number of member connections.
    pub count: usize,
    pub create_time: String,
}

/// A user or room member as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

/// Room detail: the listing entry plus its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub id: RoomId,
    pub name: String,
    pub user_id: String,
    pub user_name: String,
    pub count: usize,
    pub create_time: String,
    pub users: Vec<UserInfo>,
}
