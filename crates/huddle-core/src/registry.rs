//! The hub registry: connections, users, rooms, and the user-room index.
//!
//! Every mutating method applies one logical event completely, so a reader
//! holding the hub's read lock never observes a half-applied update. The
//! user-room index holds room `R` for user `U` exactly when `R` exists and
//! `U` either owns it or has a connection among its members.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::HubError;
use crate::queue::OutboundQueue;
use crate::room::{Room, RoomDetail, RoomId, RoomSummary, UserInfo};
use huddle_protocol::{Message, Scope};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of removing a connection from one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not a member; nothing changed.
    NotMember,
    /// The connection left and the room still has members.
    Left,
    /// The connection was the last member and the room was deleted.
    RoomRemoved,
}

/// What an unregister removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: String,
    /// Rooms the connection left that still exist.
    pub rooms_left: Vec<RoomId>,
    /// Rooms deleted because the connection was their last member.
    pub rooms_removed: Vec<RoomId>,
}

/// A recipient resolved for a broadcast.
pub type Recipient = (ConnectionId, Arc<OutboundQueue>);

/// Registry of all live hub state.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    users: HashMap<String, HashSet<ConnectionId>>,
    rooms: HashMap<RoomId, Room>,
    user_rooms: HashMap<String, HashSet<RoomId>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the global and per-user sets.
    ///
    /// Returns `true` if the connection was not registered before.
    pub fn register(&mut self, connection: ConnectionHandle) -> bool {
        let id = connection.id;
        let user_id = connection.identity.user_id.clone();
        let fresh = self.connections.insert(id, connection).is_none();
        self.users.entry(user_id).or_default().insert(id);
        fresh
    }

    /// Remove a connection everywhere and close its outbound queue.
    ///
    /// Returns `None` if the connection was not registered.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Departure> {
        let handle = self.connections.remove(&id)?;
        handle.queue.close();

        let user_id = handle.identity.user_id;
        if let Some(set) = self.users.get_mut(&user_id) {
            set.remove(&id);
            if set.is_empty() {
                self.users.remove(&user_id);
            }
        }

        let mut departure = Departure {
            user_id: user_id.clone(),
            rooms_left: Vec::new(),
            rooms_removed: Vec::new(),
        };

        // Every room holding this connection is in its user's index.
        let candidates: Vec<RoomId> = self
            .user_rooms
            .get(&user_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();

        for room_id in candidates {
            match self.detach(&user_id, id, &room_id) {
                LeaveOutcome::Left => departure.rooms_left.push(room_id),
                LeaveOutcome::RoomRemoved => departure.rooms_removed.push(room_id),
                LeaveOutcome::NotMember => {}
            }
        }

        Some(departure)
    }

    /// Insert a room and record its owner in the user-room index.
    ///
    /// Returns `false` and keeps the existing room if the id is taken.
    pub fn create_room(&mut self, room: Room) -> bool {
        if self.rooms.contains_key(&room.id) {
            return false;
        }
        self.user_rooms
            .entry(room.owner_id.clone())
            .or_default()
            .insert(room.id.clone());
        self.rooms.insert(room.id.clone(), room);
        true
    }

    /// Add the connection of (`user_id`, `device_id`) to a room.
    ///
    /// Returns `true` if the connection was not already a member.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] or [`HubError::ConnectionNotFound`].
    pub fn join_room(
        &mut self,
        user_id: &str,
        device_id: &str,
        room_id: &str,
    ) -> Result<bool, HubError> {
        if !self.rooms.contains_key(room_id) {
            return Err(HubError::RoomNotFound(room_id.to_string()));
        }
        let connection = self.find_client(user_id, device_id)?;

        let joined = self
            .rooms
            .get_mut(room_id)
            .map(|room| room.add_member(connection))
            .unwrap_or(false);

        self.user_rooms
            .entry(user_id.to_string())
            .or_default()
            .insert(room_id.to_string());

        Ok(joined)
    }

    /// Remove the connection of (`user_id`, `device_id`) from a room,
    /// deleting the room if it becomes empty.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] or [`HubError::ConnectionNotFound`].
    pub fn leave_room(
        &mut self,
        user_id: &str,
        device_id: &str,
        room_id: &str,
    ) -> Result<LeaveOutcome, HubError> {
        if !self.rooms.contains_key(room_id) {
            return Err(HubError::RoomNotFound(room_id.to_string()));
        }
        let connection = self.find_client(user_id, device_id)?;
        Ok(self.detach(user_id, connection, room_id))
    }

    fn detach(&mut self, user_id: &str, connection: ConnectionId, room_id: &str) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome::NotMember;
        };
        if !room.remove_member(connection) {
            return LeaveOutcome::NotMember;
        }

        if room.is_empty() {
            self.remove_room(room_id);
            self.unindex(user_id, room_id);
            debug!(room = %room_id, "Room empty, removed");
            return LeaveOutcome::RoomRemoved;
        }

        let owns = room.owner_id == user_id;
        if !owns && !self.user_in_room(user_id, room_id) {
            self.unindex(user_id, room_id);
        }
        LeaveOutcome::Left
    }

    fn remove_room(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.remove(room_id) {
            self.unindex(&room.owner_id, room_id);
        }
    }

    fn unindex(&mut self, user_id: &str, room_id: &str) {
        if let Some(rooms) = self.user_rooms.get_mut(user_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.user_rooms.remove(user_id);
            }
        }
    }

    fn user_in_room(&self, user_id: &str, room_id: &str) -> bool {
        match (self.users.get(user_id), self.rooms.get(room_id)) {
            (Some(connections), Some(room)) => connections.iter().any(|c| room.is_member(*c)),
            _ => false,
        }
    }

    /// Find the live connection of (`user_id`, `device_id`).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConnectionNotFound`] if there is none.
    pub fn find_client(&self, user_id: &str, device_id: &str) -> Result<ConnectionId, HubError> {
        self.users
            .get(user_id)
            .and_then(|ids| {
                ids.iter()
                    .copied()
                    .find(|id| {
                        self.connections
                            .get(id)
                            .is_some_and(|c| c.identity.device_id == device_id)
                    })
            })
            .ok_or_else(|| HubError::ConnectionNotFound {
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
            })
    }

    /// Resolve the recipients of a message from its scope and target.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] for a room-scoped message whose
    /// room does not exist.
    pub fn audience(&self, message: &Message) -> Result<Vec<Recipient>, HubError> {
        let recipients = match message.scope {
            Scope::Global => self
                .connections
                .values()
                .map(|c| (c.id, Arc::clone(&c.queue)))
                .collect(),
            Scope::Room => {
                let room = self
                    .rooms
                    .get(&message.to)
                    .ok_or_else(|| HubError::RoomNotFound(message.to.clone()))?;
                self.recipients(room.members().iter())
            }
            Scope::User => match self.users.get(&message.to) {
                Some(ids) => self.recipients(ids.iter()),
                None => Vec::new(),
            },
            other => {
                trace!(scope = ?other, "No audience for scope");
                Vec::new()
            }
        };
        Ok(recipients)
    }

    fn recipients<'a>(&self, ids: impl Iterator<Item = &'a ConnectionId>) -> Vec<Recipient> {
        ids.filter_map(|id| self.connections.get(id))
            .map(|c| (c.id, Arc::clone(&c.queue)))
            .collect()
    }

    /// Check that a room exists and admits the given password.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] or [`HubError::WrongPassword`].
    pub fn check_room_access(&self, room_id: &str, password: &str) -> Result<(), HubError> {
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_string()))?;
        if room.admits(password) {
            Ok(())
        } else {
            Err(HubError::WrongPassword(room_id.to_string()))
        }
    }

    /// Room listing, oldest first.
    #[must_use]
    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms.into_iter().map(Room::summary).collect()
    }

    /// Room detail including members, if the room exists.
    #[must_use]
    pub fn room_detail(&self, room_id: &str) -> Option<RoomDetail> {
        let room = self.rooms.get(room_id)?;
        let mut users: Vec<UserInfo> = room
            .members()
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|c| UserInfo {
                id: c.identity.user_id.clone(),
                name: c.identity.display_name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));

        let summary = room.summary();
        Some(RoomDetail {
            id: summary.id,
            name: summary.name,
            user_id: summary.user_id,
            user_name: summary.user_name,
            count: summary.count,
            create_time: summary.create_time,
            users,
        })
    }

    /// One entry per registered connection.
    #[must_use]
    pub fn users(&self) -> Vec<UserInfo> {
        let mut users: Vec<UserInfo> = self
            .connections
            .values()
            .map(|c| UserInfo {
                id: c.identity.user_id.clone(),
                name: c.identity.display_name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        users
    }

    /// Display name of any live connection of the user.
    #[must_use]
    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.users
            .get(user_id)?
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|c| c.identity.display_name.clone())
            .next()
    }

    #[must_use]
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Room ids indexed for a user.
    #[must_use]
    pub fn rooms_of(&self, user_id: &str) -> Vec<RoomId> {
        self.user_rooms
            .get(user_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Panic if any cross-map invariant is violated.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, handle) in &self.connections {
            let set = self.users.get(handle.user_id());
            assert!(
                set.is_some_and(|s| s.contains(id)),
                "{id} registered but missing from its user set"
            );
        }
        for (user_id, ids) in &self.users {
            assert!(!ids.is_empty(), "empty user set for {user_id}");
            for id in ids {
                let handle = self.connections.get(id);
                assert!(
                    handle.is_some_and(|h| h.user_id() == user_id),
                    "{id} in user set of {user_id} but not registered"
                );
            }
        }
        for (room_id, room) in &self.rooms {
            assert!(
                self.user_rooms
                    .get(&room.owner_id)
                    .is_some_and(|r| r.contains(room_id)),
                "owner index missing {room_id}"
            );
            for id in room.members() {
                let handle = self.connections.get(id);
                assert!(handle.is_some(), "{id} in room {room_id} but not registered");
                let user_id = handle.map(|h| h.user_id()).unwrap_or_default();
                assert!(
                    self.user_rooms
                        .get(user_id)
                        .is_some_and(|r| r.contains(room_id)),
                    "member index missing {room_id} for {user_id}"
                );
            }
        }
        for (user_id, rooms) in &self.user_rooms {
            assert!(!rooms.is_empty(), "empty room index for {user_id}");
            for room_id in rooms {
                let room = self.rooms.get(room_id);
                assert!(room.is_some(), "index of {user_id} holds missing room {room_id}");
                let room = room.unwrap();
                assert!(
                    room.owner_id == *user_id || self.user_in_room(user_id, room_id),
                    "index of {user_id} holds {room_id} without ownership or membership"
                );
            }
        }
    }
}
