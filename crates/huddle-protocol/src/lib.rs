//! # huddle-protocol
//!
//! Wire envelope definitions for the Huddle messaging hub.
//!
//! ## Message shapes
//!
//! - Chat messages carry a [`Payload`] and are routed by [`Scope`]
//!   (`Global`, `User`, `Room`)
//! - System messages carry a [`SystemEvent`] telling clients which
//!   listing to refresh
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, Encoding, Message, Payload, Scope};
//!
//! let message = Message::new(Scope::Room, Payload::text("Hello"), "user-1", "room-1");
//!
//! let encoded = codec::encode(&message, Encoding::Json).unwrap();
//! let decoded = codec::decode(&encoded, Encoding::Json).unwrap();
//! assert_eq!(decoded.to, "room-1");
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, Encoding, ProtocolError, MAX_FRAME_SIZE};
pub use message::{unix_now, Message, Payload, PayloadKind, Scope, SystemEvent, SystemEventKind};
