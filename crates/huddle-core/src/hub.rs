//! The hub: single authority over connections, users, and rooms.
//!
//! Mutations are submitted through one bounded channel per operation kind
//! and applied by a single event loop ([`HubRunner::run`]). Submitters wait
//! while a channel is full, so a lagging loop slows the read pumps instead
//! of buffering without limit. Only the event
//! loop takes the registry write lock. Readers take the read lock and may see
//! state older than events still waiting in the queues.
//!
//! Broadcast resolves its audience under the read lock, releases it, then
//! enqueues on each recipient's outbound queue without waiting. A connection
//! that unregisters after the snapshot may or may not still receive the
//! message.

use crate::connection::{ConnectionHandle, ConnectionId, Identity};
use crate::error::HubError;
use crate::event::{CreateRoomEvent, JoinRoomEvent, LeaveRoomEvent, RegisterEvent, UnregisterEvent};
use crate::queue::{OutboundReceiver, DEFAULT_QUEUE_CAPACITY};

/// Default capacity of each hub event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
use crate::registry::{LeaveOutcome, Registry};
use crate::room::{Room, RoomDetail, RoomId, RoomSummary, UserInfo};
use huddle_protocol::{Message, SystemEventKind};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue capacity for new connections.
    pub queue_capacity: usize,
    /// Capacity of each event channel feeding the loop.
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
    /// Messages enqueued on an outbound queue.
    pub delivered: u64,
    /// Deliveries dropped on a full or closed queue.
    pub dropped: u64,
}

#[derive(Debug)]
struct Shared {
    registry: RwLock<Registry>,
    config: HubConfig,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable handle for submitting events and reading snapshots.
#[derive(Debug, Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<RegisterEvent>,
    unregister_tx: mpsc::Sender<UnregisterEvent>,
    broadcast_tx: mpsc::Sender<Arc<Message>>,
    create_room_tx: mpsc::Sender<CreateRoomEvent>,
    join_room_tx: mpsc::Sender<JoinRoomEvent>,
    leave_room_tx: mpsc::Sender<LeaveRoomEvent>,
    shared: Arc<Shared>,
}

/// The hub event loop. Runs until every [`Hub`] handle is dropped.
pub struct HubRunner {
    register_rx: mpsc::Receiver<RegisterEvent>,
    unregister_rx: mpsc::Receiver<UnregisterEvent>,
    broadcast_rx: mpsc::Receiver<Arc<Message>>,
    create_room_rx: mpsc::Receiver<CreateRoomEvent>,
    join_room_rx: mpsc::Receiver<JoinRoomEvent>,
    leave_room_rx: mpsc::Receiver<LeaveRoomEvent>,
    // Weak so the loop's own notifications never keep it alive.
    notify_tx: mpsc::WeakSender<Arc<Message>>,
    shared: Arc<Shared>,
}

impl Hub {
    /// Create a hub handle and its event loop.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubRunner) {
        let capacity = config.event_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (create_room_tx, create_room_rx) = mpsc::channel(capacity);
        let (join_room_tx, join_room_rx) = mpsc::channel(capacity);
        let (leave_room_tx, leave_room_rx) = mpsc::channel(capacity);

        let shared = Arc::new(Shared {
            registry: RwLock::new(Registry::new()),
            config,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let runner = HubRunner {
            register_rx,
            unregister_rx,
            broadcast_rx,
            create_room_rx,
            join_room_rx,
            leave_room_rx,
            notify_tx: broadcast_tx.downgrade(),
            shared: Arc::clone(&shared),
        };

        let hub = Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            create_room_tx,
            join_room_tx,
            leave_room_tx,
            shared,
        };

        (hub, runner)
    }

    /// Create a hub and spawn its event loop on the current runtime.
    #[must_use]
    pub fn spawn(config: HubConfig) -> Self {
        let (hub, runner) = Self::new(config);
        tokio::spawn(runner.run());
        hub
    }

    /// Hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Open a connection for `identity` and submit its registration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn connect(
        &self,
        identity: Identity,
    ) -> Result<(ConnectionHandle, OutboundReceiver), HubError> {
        let (handle, receiver) = ConnectionHandle::open(identity, self.shared.config.queue_capacity);
        self.register(handle.clone()).await?;
        Ok((handle, receiver))
    }

    /// Submit a registration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        let event = RegisterEvent {
            user_id: connection.identity.user_id.clone(),
            connection,
            ack: None,
        };
        self.register_tx.send(event).await.map_err(|_| HubError::HubClosed)
    }

    /// Submit a registration and return a receiver signalled once the event
    /// loop has applied it.
    ///
    /// Pumps wait for this before reading, so a connection's unregister can
    /// never overtake its own registration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn register_acked(
        &self,
        connection: ConnectionHandle,
    ) -> Result<oneshot::Receiver<()>, HubError> {
        let (ack, registered) = oneshot::channel();
        let event = RegisterEvent {
            user_id: connection.identity.user_id.clone(),
            connection,
            ack: Some(ack),
        };
        self.register_tx.send(event).await.map_err(|_| HubError::HubClosed)?;
        Ok(registered)
    }

    /// Submit an unregistration. Unregistering twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn unregister(&self, user_id: &str, connection_id: ConnectionId) -> Result<(), HubError> {
        let event = UnregisterEvent {
            user_id: user_id.to_string(),
            connection_id,
        };
        self.unregister_tx.send(event).await.map_err(|_| HubError::HubClosed)
    }

    /// Submit a message for fan-out, waiting while the broadcast channel is
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast_tx
            .send(Arc::new(message))
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Submit a message for fan-out without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubBusy`] if the broadcast channel is full and
    /// [`HubError::HubClosed`] if the event loop has stopped.
    pub fn try_broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast_tx
            .try_send(Arc::new(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HubError::HubBusy,
                mpsc::error::TrySendError::Closed(_) => HubError::HubClosed,
            })
    }

    /// Submit creation of a room owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn create_room(&self, user_id: &str, room: Room) -> Result<(), HubError> {
        let event = CreateRoomEvent {
            user_id: user_id.to_string(),
            room_id: room.id.clone(),
            room,
        };
        self.create_room_tx.send(event).await.map_err(|_| HubError::HubClosed)
    }

    /// Submit a join of the (`user_id`, `device_id`) connection to a room.
    ///
    /// Password checks belong to the caller; see
    /// [`check_room_access`](Self::check_room_access).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn join_room(&self, user_id: &str, device_id: &str, room_id: &str) -> Result<(), HubError> {
        let event = JoinRoomEvent {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.join_room_tx.send(event).await.map_err(|_| HubError::HubClosed)
    }

    /// Submit a leave of the (`user_id`, `device_id`) connection from a room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the event loop has stopped.
    pub async fn leave_room(&self, user_id: &str, device_id: &str, room_id: &str) -> Result<(), HubError> {
        let event = LeaveRoomEvent {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.leave_room_tx.send(event).await.map_err(|_| HubError::HubClosed)
    }

    /// Room listing snapshot.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.shared.registry.read().room_summaries()
    }

    /// Room detail snapshot.
    #[must_use]
    pub fn room_detail(&self, room_id: &str) -> Option<RoomDetail> {
        self.shared.registry.read().room_detail(room_id)
    }

    /// User listing snapshot, one entry per registered connection.
    #[must_use]
    pub fn users(&self) -> Vec<UserInfo> {
        self.shared.registry.read().users()
    }

    /// Check that a room exists and admits `password`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] or [`HubError::WrongPassword`].
    pub fn check_room_access(&self, room_id: &str, password: &str) -> Result<(), HubError> {
        self.shared.registry.read().check_room_access(room_id, password)
    }

    /// Display name of any live connection of `user_id`.
    #[must_use]
    pub fn first_display_name(&self, user_id: &str) -> Option<String> {
        self.shared.registry.read().display_name(user_id)
    }

    /// Find the live connection of (`user_id`, `device_id`).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConnectionNotFound`] if there is none.
    pub fn find_client(&self, user_id: &str, device_id: &str) -> Result<ConnectionId, HubError> {
        self.shared.registry.read().find_client(user_id, device_id)
    }

    #[must_use]
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.shared.registry.read().is_registered(id)
    }

    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.shared.registry.read().room_exists(room_id)
    }

    /// Rooms the user owns or has a connection in.
    #[must_use]
    pub fn rooms_of(&self, user_id: &str) -> Vec<RoomId> {
        self.shared.registry.read().rooms_of(user_id)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let registry = self.shared.registry.read();
        HubStats {
            connections: registry.connection_count(),
            users: registry.user_count(),
            rooms: registry.room_count(),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

impl HubRunner {
    /// Run the event loop until every hub handle is gone.
    pub async fn run(mut self) {
        info!("Hub event loop started");
        loop {
            tokio::select! {
                Some(event) = self.register_rx.recv() => self.on_register(event),
                Some(event) = self.unregister_rx.recv() => self.on_unregister(event),
                Some(message) = self.broadcast_rx.recv() => self.on_broadcast(&message),
                Some(event) = self.create_room_rx.recv() => self.on_create_room(event),
                Some(event) = self.join_room_rx.recv() => self.on_join_room(event),
                Some(event) = self.leave_room_rx.recv() => self.on_leave_room(event),
                else => break,
            }
        }
        info!("Hub event loop stopped");
    }

    fn on_register(&self, event: RegisterEvent) {
        let connection_id = event.connection.id;
        let fresh = self.shared.registry.write().register(event.connection);
        if let Some(ack) = event.ack {
            let _ = ack.send(());
        }
        if !fresh {
            debug!(connection = %connection_id, "Connection already registered");
            return;
        }
        info!(user = %event.user_id, connection = %connection_id, "Connection registered");
        self.notify(
            SystemEventKind::UsersChanged,
            json!({ "userId": event.user_id, "message": "online" }),
        );
    }

    fn on_unregister(&self, event: UnregisterEvent) {
        let departure = self.shared.registry.write().unregister(event.connection_id);
        let Some(departure) = departure else {
            debug!(connection = %event.connection_id, "Connection already unregistered");
            return;
        };
        info!(
            user = %departure.user_id,
            connection = %event.connection_id,
            rooms_left = departure.rooms_left.len(),
            rooms_removed = departure.rooms_removed.len(),
            "Connection unregistered"
        );
        self.notify(
            SystemEventKind::UsersChanged,
            json!({ "userId": departure.user_id, "message": "offline" }),
        );
    }

    fn on_broadcast(&self, message: &Arc<Message>) {
        // Snapshot; the read guard is released before delivery.
        let audience = self.shared.registry.read().audience(message);
        let recipients = match audience {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(scope = ?message.scope, to = %message.to, "Broadcast dropped: {}", e);
                return;
            }
        };

        let mut delivered = 0u64;
        let mut dropped = 0u64;
        for (connection_id, queue) in recipients {
            match queue.try_send(Arc::clone(message)) {
                Ok(()) => delivered += 1,
                Err(HubError::QueueFull) => {
                    dropped += 1;
                    warn!(connection = %connection_id, "Outbound queue full, message dropped");
                }
                Err(e) => {
                    dropped += 1;
                    debug!(connection = %connection_id, "Delivery skipped: {}", e);
                }
            }
        }

        self.shared.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.shared.dropped.fetch_add(dropped, Ordering::Relaxed);
        trace!(scope = ?message.scope, delivered, dropped, "Broadcast complete");
    }

    fn on_create_room(&self, event: CreateRoomEvent) {
        let room_id = event.room_id;
        let created = self.shared.registry.write().create_room(event.room);
        if !created {
            warn!(room = %room_id, user = %event.user_id, "Room already exists");
            return;
        }
        info!(room = %room_id, user = %event.user_id, "Room created");
        self.notify(SystemEventKind::RoomsChanged, serde_json::Value::Null);
    }

    fn on_join_room(&self, event: JoinRoomEvent) {
        let result = self
            .shared
            .registry
            .write()
            .join_room(&event.user_id, &event.device_id, &event.room_id);
        match result {
            Ok(joined) => {
                debug!(room = %event.room_id, user = %event.user_id, joined, "Joined room");
                self.notify(SystemEventKind::RoomDetailChanged, json!(event.room_id));
                self.notify(SystemEventKind::RoomsChanged, serde_json::Value::Null);
            }
            Err(e) => warn!(room = %event.room_id, user = %event.user_id, "Join abandoned: {}", e),
        }
    }

    fn on_leave_room(&self, event: LeaveRoomEvent) {
        let result = self
            .shared
            .registry
            .write()
            .leave_room(&event.user_id, &event.device_id, &event.room_id);
        match result {
            Ok(outcome) => {
                debug!(room = %event.room_id, user = %event.user_id, ?outcome, "Left room");
                if outcome == LeaveOutcome::RoomRemoved {
                    info!(room = %event.room_id, "Room removed");
                }
                self.notify(SystemEventKind::RoomDetailChanged, json!(event.room_id));
            }
            Err(e) => warn!(room = %event.room_id, user = %event.user_id, "Leave abandoned: {}", e),
        }
    }

    /// Queue a global system notification behind pending broadcasts.
    fn notify(&self, kind: SystemEventKind, data: serde_json::Value) {
        let Some(tx) = self.notify_tx.upgrade() else {
            trace!(?kind, "Hub shutting down, notification skipped");
            return;
        };
        match tx.try_send(Arc::new(Message::global_event(kind, data))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(?kind, "Broadcast channel full, notification dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => trace!(?kind, "Notification skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::{Payload, Scope};
    use std::time::Duration;

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..5000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    fn identity(user: &str, device: &str) -> Identity {
        Identity::new(user, device, format!("{user} name")).unwrap()
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Arc<Message>> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    fn chat(messages: &[Arc<Message>]) -> Vec<&Arc<Message>> {
        messages.iter().filter(|m| !m.is_system()).collect()
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, _rx_a) = hub.connect(identity("u1", "d1")).await.unwrap();
        let (b, _rx_b) = hub.connect(identity("u1", "d2")).await.unwrap();

        eventually(|| hub.is_registered(a.id) && hub.is_registered(b.id)).await;
        let stats = hub.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.users, 1);
        assert_eq!(hub.find_client("u1", "d2"), Ok(b.id));

        hub.unregister("u1", a.id).await.unwrap();
        eventually(|| !hub.is_registered(a.id)).await;
        assert!(a.queue.is_closed());
        assert_eq!(hub.stats().users, 1);
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_unregister_twice_is_noop() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, _rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;

        hub.unregister("u1", a.id).await.unwrap();
        hub.unregister("u1", a.id).await.unwrap();
        hub.unregister("u1", ConnectionId::next()).await.unwrap();
        eventually(|| hub.stats().connections == 0).await;

        // A later registration still works.
        let (b, _rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(b.id)).await;
        assert_eq!(hub.stats().users, 1);
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_register_notifies_online_and_offline() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx_a) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;

        let (b, _rx_b) = hub.connect(identity("u2", "d1")).await.unwrap();
        eventually(|| hub.is_registered(b.id)).await;
        hub.unregister("u2", b.id).await.unwrap();

        let mut seen = Vec::new();
        eventually(|| {
            seen.extend(drain(&mut rx_a));
            seen.iter()
                .filter_map(|m| m.system_event.as_ref())
                .any(|e| e.data["userId"] == "u2" && e.data["message"] == "offline")
        })
        .await;

        let online = seen
            .iter()
            .filter_map(|m| m.system_event.as_ref())
            .any(|e| {
                e.kind == SystemEventKind::UsersChanged
                    && e.data["userId"] == "u2"
                    && e.data["message"] == "online"
            });
        assert!(online);
        assert!(seen.iter().all(|m| m.scope == Scope::Global));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_snapshot_audience() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx_a) = hub.connect(identity("u1", "d1")).await.unwrap();
        let (b, mut rx_b) = hub.connect(identity("u2", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id) && hub.is_registered(b.id)).await;

        hub.broadcast(Message::new(Scope::Global, Payload::text("hello"), "u1", ""))
            .await
            .unwrap();

        let mut got_a = Vec::new();
        let mut got_b = Vec::new();
        eventually(|| {
            got_a.extend(drain(&mut rx_a));
            got_b.extend(drain(&mut rx_b));
            !chat(&got_a).is_empty() && !chat(&got_b).is_empty()
        })
        .await;

        // Registered after the broadcast was resolved.
        let (c, mut rx_c) = hub.connect(identity("u3", "d1")).await.unwrap();
        eventually(|| hub.is_registered(c.id)).await;
        hub.broadcast(Message::new(Scope::User, Payload::text("marker"), "u1", "u3"))
            .await
            .unwrap();

        let mut got_c = Vec::new();
        eventually(|| {
            got_c.extend(drain(&mut rx_c));
            !chat(&got_c).is_empty()
        })
        .await;
        let chat_c = chat(&got_c);
        assert_eq!(chat_c.len(), 1);
        assert_eq!(chat_c[0].payload.as_ref().unwrap().content, "marker");
    }

    #[tokio::test]
    async fn test_room_and_user_scoped_delivery() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx_a) = hub.connect(identity("u1", "d1")).await.unwrap();
        let (b, mut rx_b) = hub.connect(identity("u2", "d1")).await.unwrap();
        let (c, mut rx_c) = hub.connect(identity("u3", "d1")).await.unwrap();
        eventually(|| [a.id, b.id, c.id].iter().all(|id| hub.is_registered(*id))).await;

        hub.create_room("u1", Room::new("r1", "lobby", "", "u1", "u1 name"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("r1")).await;
        hub.join_room("u1", "d1", "r1").await.unwrap();
        hub.join_room("u2", "d1", "r1").await.unwrap();
        eventually(|| hub.room_detail("r1").is_some_and(|d| d.count == 2)).await;

        hub.broadcast(Message::new(Scope::Room, Payload::text("room"), "u1", "r1"))
            .await
            .unwrap();
        hub.broadcast(Message::new(Scope::User, Payload::text("direct"), "u1", "u3"))
            .await
            .unwrap();
        hub.broadcast(Message::new(Scope::Room, Payload::text("lost"), "u1", "nope"))
            .await
            .unwrap();

        let (mut got_a, mut got_b, mut got_c) = (Vec::new(), Vec::new(), Vec::new());
        eventually(|| {
            got_a.extend(drain(&mut rx_a));
            got_b.extend(drain(&mut rx_b));
            got_c.extend(drain(&mut rx_c));
            !chat(&got_a).is_empty() && !chat(&got_b).is_empty() && !chat(&got_c).is_empty()
        })
        .await;

        let body = |m: &Arc<Message>| m.payload.as_ref().unwrap().content.clone();
        assert_eq!(chat(&got_a).into_iter().map(body).collect::<Vec<_>>(), vec!["room"]);
        assert_eq!(chat(&got_b).into_iter().map(body).collect::<Vec<_>>(), vec!["room"]);
        assert_eq!(chat(&got_c).into_iter().map(body).collect::<Vec<_>>(), vec!["direct"]);
    }

    #[tokio::test]
    async fn test_password_gate() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, _rx) = hub.connect(identity("u2", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;
        hub.create_room("u1", Room::new("r1", "vault", "secret", "u1", "u1 name"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("r1")).await;

        for attempt in ["", "wrong"] {
            assert_eq!(
                hub.check_room_access("r1", attempt),
                Err(HubError::WrongPassword("r1".to_string()))
            );
        }
        assert_eq!(hub.room_detail("r1").unwrap().count, 0);

        assert_eq!(hub.check_room_access("r1", "secret"), Ok(()));
        hub.join_room("u2", "d1", "r1").await.unwrap();
        eventually(|| hub.room_detail("r1").is_some_and(|d| d.count == 1)).await;
    }

    #[tokio::test]
    async fn test_room_lifecycle_scenario() {
        let hub = Hub::spawn(HubConfig::default());
        hub.create_room("U1", Room::new("R1", "general", "", "U1", "User One"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("R1")).await;

        let listing = hub.rooms();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].count, 0);
        assert!(!listing[0].has_password);

        let (u2, _rx) = hub.connect(identity("U2", "D1")).await.unwrap();
        eventually(|| hub.is_registered(u2.id)).await;
        hub.join_room("U2", "D1", "R1").await.unwrap();
        eventually(|| hub.rooms().first().is_some_and(|r| r.count == 1)).await;

        let detail = hub.room_detail("R1").unwrap();
        assert_eq!(detail.users.len(), 1);
        assert_eq!(detail.users[0].id, "U2");

        // Read pump failure path.
        hub.unregister("U2", u2.id).await.unwrap();
        eventually(|| hub.rooms().is_empty()).await;
        assert!(hub.room_detail("R1").is_none());
        assert!(hub.rooms_of("U1").is_empty());
        assert!(hub.rooms_of("U2").is_empty());
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_leave_empties_room() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, _rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;
        hub.create_room("u1", Room::new("r1", "lobby", "", "u1", "u1 name"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("r1")).await;

        hub.join_room("u1", "d1", "r1").await.unwrap();
        eventually(|| hub.room_detail("r1").is_some_and(|d| d.count == 1)).await;
        hub.leave_room("u1", "d1", "r1").await.unwrap();
        eventually(|| !hub.room_exists("r1")).await;
        assert!(hub.rooms_of("u1").is_empty());
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_leave_by_non_member_still_notifies() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;
        hub.create_room("u2", Room::new("r1", "lobby", "", "u2", "u2 name"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("r1")).await;

        hub.leave_room("u1", "d1", "r1").await.unwrap();

        let mut seen = Vec::new();
        eventually(|| {
            seen.extend(drain(&mut rx));
            seen.iter()
                .filter_map(|m| m.system_event.as_ref())
                .any(|e| e.kind == SystemEventKind::RoomDetailChanged && e.data == "r1")
        })
        .await;
        assert_eq!(hub.room_detail("r1").unwrap().count, 0);
        assert!(hub.rooms_of("u1").is_empty());
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_full_queue_counts_drops() {
        let hub = Hub::spawn(HubConfig {
            queue_capacity: 2,
            ..HubConfig::default()
        });
        let (a, _rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        eventually(|| hub.is_registered(a.id)).await;

        // The online notification already occupies one slot.
        for n in 0..3 {
            hub.broadcast(Message::new(Scope::User, Payload::text(n.to_string()), "u2", "u1"))
                .await
                .unwrap();
        }
        eventually(|| hub.stats().delivered + hub.stats().dropped == 4).await;
        let stats = hub.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_loop_stops_when_handles_dropped() {
        let (hub, runner) = Hub::new(HubConfig::default());
        let task = tokio::spawn(runner.run());
        let (_a, _rx) = hub.connect(identity("u1", "d1")).await.unwrap();
        drop(hub);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_acked() {
        let hub = Hub::spawn(HubConfig::default());
        let (handle, _rx) = ConnectionHandle::open(identity("u1", "d1"), 4);
        let registered = hub.register_acked(handle.clone()).await.unwrap();

        registered.await.unwrap();
        assert!(hub.is_registered(handle.id));
    }

    #[tokio::test]
    async fn test_submit_after_stop_reports_closed() {
        let (hub, runner) = Hub::new(HubConfig::default());
        drop(runner);
        assert_eq!(
            hub.broadcast(Message::new(Scope::Global, Payload::text("x"), "u1", "")).await,
            Err(HubError::HubClosed)
        );
        assert!(matches!(
            hub.connect(identity("u1", "d1")).await,
            Err(HubError::HubClosed)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stress() {
        const N: usize = 1000;
        let hub = Hub::spawn(HubConfig {
            queue_capacity: 8,
            ..HubConfig::default()
        });
        hub.create_room("owner", Room::new("shared", "shared", "", "owner", "Owner"))
            .await
            .unwrap();
        eventually(|| hub.room_exists("shared")).await;

        let mut tasks = Vec::with_capacity(N);
        for n in 0..N {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let user = format!("user-{}", n % 250);
                let device = format!("device-{n}");
                let (handle, rx) = hub.connect(identity(&user, &device)).await.unwrap();
                while !hub.is_registered(handle.id) {
                    tokio::task::yield_now().await;
                }
                hub.join_room(&user, &device, "shared").await.unwrap();
                (handle, rx)
            }));
        }

        let mut connections = Vec::with_capacity(N);
        for task in tasks {
            connections.push(task.await.unwrap());
        }
        eventually(|| hub.room_detail("shared").is_some_and(|d| d.count == N)).await;

        let stats = hub.stats();
        assert_eq!(stats.connections, N);
        assert_eq!(stats.users, 250);
        hub.shared.registry.read().assert_consistent();

        let mut leaving = Vec::with_capacity(N);
        for (handle, _rx) in &connections {
            let hub = hub.clone();
            let user = handle.identity.user_id.clone();
            let id = handle.id;
            leaving.push(tokio::spawn(async move { hub.unregister(&user, id).await.unwrap() }));
        }
        for task in leaving {
            task.await.unwrap();
        }

        eventually(|| hub.stats().connections == 0).await;
        let stats = hub.stats();
        assert_eq!(stats.users, 0);
        assert_eq!(stats.rooms, 0);
        assert!(hub.rooms_of("owner").is_empty());
        assert!(connections.iter().all(|(h, _)| h.queue.is_closed()));
        hub.shared.registry.read().assert_consistent();
    }

    #[tokio::test]
    async fn test_stalled_loop_stops_accepting_at_capacity() {
        let (hub, runner) = Hub::new(HubConfig {
            event_capacity: 4,
            ..HubConfig::default()
        });
        let message = || Message::new(Scope::Global, Payload::text("x"), "u1", "");

        for _ in 0..4 {
            hub.try_broadcast(message()).unwrap();
        }
        assert_eq!(hub.try_broadcast(message()), Err(HubError::HubBusy));

        // Waiting submitters stay parked until the loop drains the channel.
        let parked = tokio::time::timeout(Duration::from_millis(50), hub.broadcast(message())).await;
        assert!(parked.is_err());

        tokio::spawn(runner.run());
        tokio::time::timeout(Duration::from_secs(5), hub.broadcast(message()))
            .await
            .unwrap()
            .unwrap();
    }
}
