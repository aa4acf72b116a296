//! In-process transport for tests and benchmarks.
//!
//! [`memory_transport`] returns the two pump halves plus a [`MemoryPeer`]
//! that plays the remote client.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, TransportError, WireFrame};

type Inbound = Result<WireFrame, TransportError>;

/// Remote end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_server: Option<mpsc::UnboundedSender<Inbound>>,
    from_server: mpsc::UnboundedReceiver<WireFrame>,
}

/// Server-side reading half.
#[derive(Debug)]
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

/// Server-side writing half.
#[derive(Debug)]
pub struct MemoryWriter {
    tx: mpsc::UnboundedSender<WireFrame>,
}

/// Create a connected in-memory transport.
#[must_use]
pub fn memory_transport() -> (MemoryPeer, MemoryReader, MemoryWriter) {
    let (to_server, rx) = mpsc::unbounded_channel();
    let (tx, from_server) = mpsc::unbounded_channel();
    let peer = MemoryPeer {
        to_server: Some(to_server),
        from_server,
    };
    (peer, MemoryReader { rx }, MemoryWriter { tx })
}

impl MemoryPeer {
    /// Deliver a frame to the server. Returns `false` once the reader is gone.
    pub fn send(&self, frame: WireFrame) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Make the server's next read fail.
    pub fn fail(&self, error: TransportError) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// End the inbound stream; the server reads end-of-stream.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    /// Stop accepting frames; the server's next write fails.
    pub fn stop_reading(&mut self) {
        self.from_server.close();
    }

    /// Wait for the next frame written by the server.
    pub async fn recv(&mut self) -> Option<WireFrame> {
        self.from_server.recv().await
    }

    /// Take a frame written by the server if one is ready.
    pub fn try_recv(&mut self) -> Option<WireFrame> {
        self.from_server.try_recv().ok()
    }
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}
