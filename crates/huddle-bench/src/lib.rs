//! Shared fixtures for the Huddle benchmarks.

use huddle_core::{ConnectionHandle, Identity, OutboundReceiver, Registry, Room};

/// Room every fixture connection joins.
pub const BENCH_ROOM: &str = "bench-room";

/// Fixture identity for connection `n`.
#[must_use]
pub fn identity(n: usize) -> Identity {
    Identity {
        user_id: format!("user-{n}"),
        device_id: format!("device-{n}"),
        display_name: format!("User {n}"),
    }
}

/// Registry with `connections` registered connections, all members of
/// [`BENCH_ROOM`].
#[must_use]
pub fn populated_registry(
    connections: usize,
    capacity: usize,
) -> (Registry, Vec<(ConnectionHandle, OutboundReceiver)>) {
    let mut registry = Registry::new();
    registry.create_room(Room::new(BENCH_ROOM, "bench", "", "owner", "Owner"));

    let handles = (0..connections)
        .map(|n| {
            let (handle, rx) = ConnectionHandle::open(identity(n), capacity);
            registry.register(handle.clone());
            let joined = registry.join_room(&handle.identity.user_id, &handle.identity.device_id, BENCH_ROOM);
            debug_assert!(joined.is_ok());
            (handle, rx)
        })
        .collect();

    (registry, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populated_registry() {
        let (registry, handles) = populated_registry(10, 4);
        assert_eq!(handles.len(), 10);
        assert_eq!(registry.connection_count(), 10);
        assert_eq!(registry.room_detail(BENCH_ROOM).unwrap().count, 10);
    }
}
