//! Connection identity and handles.
//!
//! The hub keys every live connection by an opaque [`ConnectionId`]. A
//! [`ConnectionHandle`] is what the registry stores: the identity plus the
//! sending half of the connection's outbound queue. Connections never hold a
//! reference back into the registry.

use crate::error::HubError;
use crate::queue::{outbound_queue, OutboundQueue, OutboundReceiver};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique connection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The pre-issued identity triple of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
    pub device_id: String,
    pub display_name: String,
}

impl Identity {
    /// Build an identity; user and device ids must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidIdentity`] when a required field is empty.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self, HubError> {
        let identity = Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            display_name: display_name.into(),
        };
        if identity.user_id.is_empty() {
            return Err(HubError::InvalidIdentity("user id cannot be empty"));
        }
        if identity.device_id.is_empty() {
            return Err(HubError::InvalidIdentity("device id cannot be empty"));
        }
        Ok(identity)
    }
}

/// Registry-side view of a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub identity: Identity,
    pub queue: Arc<OutboundQueue>,
}

impl ConnectionHandle {
    /// Open a new connection with a fresh ID and an outbound queue of the
    /// given capacity.
    #[must_use]
    pub fn open(identity: Identity, capacity: usize) -> (Self, OutboundReceiver) {
        let (queue, receiver) = outbound_queue(capacity);
        let handle = Self {
            id: ConnectionId::next(),
            identity,
            queue,
        };
        (handle, receiver)
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }
}
