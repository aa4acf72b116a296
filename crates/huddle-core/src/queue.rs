//! Bounded per-connection outbound queue.
//!
//! The hub enqueues without ever waiting: a full queue drops the message
//! and a closed queue reports [`HubError::QueueClosed`]. Closing drops the
//! only sender, so the receiving write pump still drains whatever was
//! buffered before it observes the end of the queue.

use crate::error::HubError;
use huddle_protocol::Message;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Sending half of an outbound queue, shared between the hub and snapshots.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: Mutex<Option<mpsc::Sender<Arc<Message>>>>,
    capacity: usize,
}

/// Receiving half of an outbound queue, owned by the write pump.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<Arc<Message>>,
}

/// Create an outbound queue with the given capacity (at least 1).
#[must_use]
pub fn outbound_queue(capacity: usize) -> (Arc<OutboundQueue>, OutboundReceiver) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    let queue = OutboundQueue {
        sender: Mutex::new(Some(sender)),
        capacity,
    };
    (Arc::new(queue), OutboundReceiver { receiver })
}

impl OutboundQueue {
    /// Enqueue a message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::QueueFull`] when at capacity and
    /// [`HubError::QueueClosed`] after [`close`](Self::close) or once the
    /// receiver is gone.
    pub fn try_send(&self, message: Arc<Message>) -> Result<(), HubError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(HubError::QueueClosed);
        };
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(HubError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(HubError::QueueClosed),
        }
    }

    /// Close the queue.
    ///
    /// Returns `true` if this call closed it, `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    /// Check whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Maximum number of buffered messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl OutboundReceiver {
    /// Wait for the next message; `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.recv().await
    }

    /// Take a buffered message if one is available.
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::{Payload, Scope};

    fn message(n: usize) -> Arc<Message> {
        Arc::new(Message::new(
            Scope::User,
            Payload::text(n.to_string()),
            "u1",
            "u2",
        ))
    }

    #[test]
    fn test_capacity_plus_one_drops_exactly_last() {
        let capacity = 8;
        let (queue, mut rx) = outbound_queue(capacity);

        let results: Vec<_> = (0..=capacity).map(|n| queue.try_send(message(n))).collect();

        assert!(results[..capacity].iter().all(Result::is_ok));
        assert_eq!(results[capacity], Err(HubError::QueueFull));

        for n in 0..capacity {
            let received = rx.try_recv().unwrap();
            assert_eq!(received.payload.as_ref().unwrap().content, n.to_string());
        }
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_send_after_close_is_reported() {
        let (queue, _rx) = outbound_queue(4);

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
        assert_eq!(queue.try_send(message(0)), Err(HubError::QueueClosed));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (queue, rx) = outbound_queue(4);
        drop(rx);
        assert_eq!(queue.try_send(message(0)), Err(HubError::QueueClosed));
    }

    #[tokio::test]
    async fn test_close_drains_buffered_then_ends() {
        let (queue, mut rx) = outbound_queue(4);
        queue.try_send(message(1)).unwrap();
        queue.try_send(message(2)).unwrap();
        queue.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (queue, _rx) = outbound_queue(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.try_send(message(0)).is_ok());
        assert_eq!(queue.try_send(message(1)), Err(HubError::QueueFull));
    }
}
