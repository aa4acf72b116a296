//! # huddle-transport
//!
//! Transport layer for the Huddle realtime messaging server.
//!
//! - **Traits** - [`FrameReader`] and [`FrameWriter`] over [`WireFrame`]s
//! - **WebSocket** - Adapter for sockets upgraded by axum
//! - **Memory** - In-process transport for tests
//! - **Pumps** - Per-connection read/write loops with ping/pong liveness
//! - **Origin** - Allow-list checks for upgrade requests
//!
//! ```rust,ignore
//! use huddle_transport::{websocket, Connection, PumpConfig};
//!
//! let connection = Connection::open(&hub, identity, encoding).await?;
//! let (writer, reader) = websocket::split(socket);
//! connection.run(hub, reader, writer, handler, PumpConfig::default()).await;
//! ```

pub mod memory;
pub mod origin;
pub mod pump;
pub mod traits;
pub mod websocket;

pub use memory::{memory_transport, MemoryPeer, MemoryReader, MemoryWriter};
pub use origin::{match_origin, OriginPolicy};
pub use pump::{read_pump, write_pump, Connection, InboundHandler, PumpConfig, PumpExit};
pub use traits::{FrameReader, FrameWriter, TransportError, WireFrame};
