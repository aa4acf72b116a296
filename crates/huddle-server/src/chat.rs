//! Chat service: turns inbound frames into hub broadcasts.

use async_trait::async_trait;
use huddle_core::{Hub, Identity};
use huddle_protocol::{decode, unix_now, Encoding};
use huddle_transport::InboundHandler;
use tracing::{debug, warn};

use crate::metrics;

/// Decodes client messages, stamps the sender, and submits them for fan-out.
#[derive(Debug, Clone)]
pub struct ChatService {
    hub: Hub,
}

impl ChatService {
    #[must_use]
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl InboundHandler for ChatService {
    async fn on_message(&self, sender: &Identity, encoding: Encoding, data: &[u8]) {
        metrics::record_message(data.len(), if encoding.is_text() { "json" } else { "msgpack" });

        let mut message = match decode(data, encoding) {
            Ok(message) => message,
            Err(e) => {
                warn!(user = %sender.user_id, device = %sender.device_id, "Malformed message dropped: {}", e);
                metrics::record_error("decode");
                return;
            }
        };

        // The sender is whoever owns the connection; only the hub emits system events.
        message.from = sender.user_id.clone();
        message.system_event = None;
        if message.timestamp == 0 {
            message.timestamp = unix_now();
        }

        debug!(user = %sender.user_id, scope = ?message.scope, to = %message.to, "Inbound message");
        if let Err(e) = self.hub.broadcast(message).await {
            debug!(user = %sender.user_id, "Broadcast not submitted: {}", e);
        }
    }
}
