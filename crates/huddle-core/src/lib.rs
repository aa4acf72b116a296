//! # huddle-core
//!
//! Connection hub, rooms, and message fan-out for the Huddle realtime
//! messaging server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Hub** - Single event loop owning all membership state
//! - **Registry** - Connections, users, rooms, and the user-room index
//! - **Room** - Named, optionally password-protected membership groups
//! - **Queue** - Bounded, non-blocking per-connection outbound queues
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  events   ┌─────────────┐  write   ┌─────────────┐
//! │ Connection  │──────────▶│  HubRunner  │─────────▶│  Registry   │
//! └─────────────┘           └─────────────┘          └─────────────┘
//!        ▲                         │ fan-out                ▲
//!        │                         ▼                        │ read
//! ┌─────────────┐           ┌─────────────┐          ┌─────────────┐
//! │ Write pump  │◀──────────│  Outbound   │          │  Snapshots  │
//! └─────────────┘           │   queues    │          └─────────────┘
//!                           └─────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod event;
pub mod hub;
pub mod queue;
pub mod registry;
pub mod room;

pub use connection::{ConnectionHandle, ConnectionId, Identity};
pub use error::HubError;
pub use hub::{Hub, HubConfig, HubRunner, HubStats, DEFAULT_EVENT_CAPACITY};
pub use queue::{outbound_queue, OutboundQueue, OutboundReceiver, DEFAULT_QUEUE_CAPACITY};
pub use registry::{Departure, LeaveOutcome, Registry};
pub use room::{validate_room_name, Room, RoomDetail, RoomId, RoomSummary, UserInfo, MAX_ROOM_NAME_LENGTH};
