//! Per-connection read and write pumps.
//!
//! Each connection runs exactly two pumps. The read pump is the only reader
//! of the socket and owns the liveness deadline; the write pump is the only
//! writer and drains the connection's outbound queue. Either pump exiting
//! ends the connection, and teardown always goes through a single
//! unregister submitted by the read side.

use async_trait::async_trait;
use bytes::Bytes;
use huddle_core::{ConnectionHandle, ConnectionId, Hub, HubError, Identity, OutboundReceiver};
use huddle_protocol::{encode, Encoding, Message, MAX_FRAME_SIZE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::{interval_at, timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::traits::{FrameReader, FrameWriter, TransportError, WireFrame};

/// Keepalive and size limits for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// Interval between pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// How long the read side waits for a pong before giving up.
    pub pong_wait: Duration,
    /// Deadline for a single write.
    pub write_wait: Duration,
    /// Largest accepted inbound data frame.
    pub max_frame_size: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            ping_period: pong_wait * 9 / 10,
            pong_wait,
            write_wait: Duration::from_secs(10),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl PumpConfig {
    /// Check that the keepalive timings can work together.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ping_period.is_zero() {
            return Err("ping period must be positive");
        }
        if self.ping_period >= self.pong_wait {
            return Err("ping period must be shorter than pong wait");
        }
        if self.write_wait.is_zero() {
            return Err("write wait must be positive");
        }
        if self.max_frame_size == 0 {
            return Err("max frame size must be positive");
        }
        Ok(())
    }
}

/// Receives inbound data frames from the read pump.
///
/// The read pump awaits each call before reading the next frame, so a
/// handler waiting on a full hub holds back the socket.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one data frame sent by `sender`, encoded as `encoding`.
    async fn on_message(&self, sender: &Identity, encoding: Encoding, data: &[u8]);
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer closed the connection or the stream ended.
    Closed,
    /// No pong arrived within the pong wait.
    Timeout,
    /// Inbound frame exceeded the size limit.
    FrameTooLarge,
    /// Reading or writing failed.
    Failed,
    /// The outbound queue was closed by the hub.
    QueueClosed,
    /// The other pump stopped first.
    Stopped,
}

/// A live connection between a transport and the hub.
#[derive(Debug)]
pub struct Connection {
    pub handle: ConnectionHandle,
    pub encoding: Encoding,
    outbound: OutboundReceiver,
    registered: oneshot::Receiver<()>,
}

impl Connection {
    /// Open a connection for `identity` and submit its registration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has stopped.
    pub async fn open(hub: &Hub, identity: Identity, encoding: Encoding) -> Result<Self, HubError> {
        let (handle, outbound) = ConnectionHandle::open(identity, hub.config().queue_capacity);
        let registered = hub.register_acked(handle.clone()).await?;
        debug!(
            user = %handle.identity.user_id,
            device = %handle.identity.device_id,
            connection = %handle.id,
            ?encoding,
            "Connection opened"
        );
        Ok(Self {
            handle,
            encoding,
            outbound,
            registered,
        })
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// Run both pumps until the connection ends, then unregister it.
    pub async fn run<R, W, H>(
        self,
        hub: Hub,
        mut reader: R,
        writer: W,
        handler: Arc<H>,
        config: PumpConfig,
    ) where
        R: FrameReader,
        W: FrameWriter + 'static,
        H: InboundHandler + ?Sized,
    {
        let Self {
            handle,
            encoding,
            outbound,
            registered,
        } = self;
        let connection_id = handle.id;

        if registered.await.is_err() {
            warn!(connection = %connection_id, "Hub stopped before registration");
            return;
        }
        let write_done = Arc::new(Notify::new());

        let write_task = tokio::spawn(write_pump(
            writer,
            outbound,
            encoding,
            config.clone(),
            Arc::clone(&write_done),
            connection_id,
        ));

        let read_exit = read_pump(
            &mut reader,
            &handle.identity,
            handler.as_ref(),
            &config,
            &write_done,
            connection_id,
        )
        .await;

        if let Err(e) = hub.unregister(&handle.identity.user_id, connection_id).await {
            // Without the hub nobody else will end the write pump.
            debug!(connection = %connection_id, "Unregister failed: {}", e);
            handle.queue.close();
        }

        let write_exit = write_task.await.unwrap_or(PumpExit::Failed);
        info!(
            user = %handle.identity.user_id,
            connection = %connection_id,
            ?read_exit,
            ?write_exit,
            "Connection closed"
        );
    }
}

/// Read frames until the connection ends.
///
/// The read deadline is renewed only by pongs. Data frames go to `handler`;
/// text frames are JSON and binary frames are MessagePack.
pub async fn read_pump<R, H>(
    reader: &mut R,
    identity: &Identity,
    handler: &H,
    config: &PumpConfig,
    stop: &Notify,
    connection_id: ConnectionId,
) -> PumpExit
where
    R: FrameReader + ?Sized,
    H: InboundHandler + ?Sized,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let received = tokio::select! {
            result = timeout_at(deadline, reader.recv()) => result,
            () = stop.notified() => {
                trace!(connection = %connection_id, "Write pump stopped, ending read pump");
                return PumpExit::Stopped;
            }
        };

        let frame = match received {
            Err(_) => {
                debug!(connection = %connection_id, "Pong wait elapsed");
                return PumpExit::Timeout;
            }
            Ok(Err(e)) => {
                warn!(connection = %connection_id, "Read error: {}", e);
                return PumpExit::Failed;
            }
            Ok(Ok(None)) => return PumpExit::Closed,
            Ok(Ok(Some(frame))) => frame,
        };

        if frame.is_data() && frame.len() > config.max_frame_size {
            let err = TransportError::FrameTooLarge {
                size: frame.len(),
                max: config.max_frame_size,
            };
            warn!(connection = %connection_id, "{}", err);
            return PumpExit::FrameTooLarge;
        }

        match frame {
            WireFrame::Text(text) => {
                handler.on_message(identity, Encoding::Json, text.as_bytes()).await;
            }
            WireFrame::Binary(data) => {
                handler.on_message(identity, Encoding::MessagePack, &data).await;
            }
            WireFrame::Pong(_) => {
                deadline = Instant::now() + config.pong_wait;
                trace!(connection = %connection_id, "Pong received");
            }
            WireFrame::Ping(_) => {}
            WireFrame::Close => {
                debug!(connection = %connection_id, "Close frame received");
                return PumpExit::Closed;
            }
        }
    }
}

/// Drain the outbound queue to the socket and send keepalive pings.
///
/// Signals `done` on exit so the read pump stops too.
pub async fn write_pump<W>(
    mut writer: W,
    mut outbound: OutboundReceiver,
    encoding: Encoding,
    config: PumpConfig,
    done: Arc<Notify>,
    connection_id: ConnectionId,
) -> PumpExit
where
    W: FrameWriter,
{
    let exit = write_loop(&mut writer, &mut outbound, encoding, &config, connection_id).await;
    done.notify_one();
    exit
}

async fn write_loop<W>(
    writer: &mut W,
    outbound: &mut OutboundReceiver,
    encoding: Encoding,
    config: &PumpConfig,
    connection_id: ConnectionId,
) -> PumpExit
where
    W: FrameWriter + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            item = outbound.recv() => {
                let Some(message) = item else {
                    if timeout(config.write_wait, writer.close()).await.is_err() {
                        debug!(connection = %connection_id, "Close frame timed out");
                    }
                    return PumpExit::QueueClosed;
                };
                let Some(frame) = to_frame(&message, encoding, connection_id) else {
                    continue;
                };
                if let Err(e) = write_with_deadline(writer, frame, config.write_wait).await {
                    debug!(connection = %connection_id, "Write error: {}", e);
                    return PumpExit::Failed;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write_with_deadline(writer, WireFrame::Ping(Bytes::new()), config.write_wait).await {
                    debug!(connection = %connection_id, "Ping error: {}", e);
                    return PumpExit::Failed;
                }
            }
        }
    }
}

async fn write_with_deadline<W>(
    writer: &mut W,
    frame: WireFrame,
    write_wait: Duration,
) -> Result<(), TransportError>
where
    W: FrameWriter + ?Sized,
{
    timeout(write_wait, writer.send(frame))
        .await
        .map_err(|_| TransportError::Timeout)?
}

fn to_frame(message: &Message, encoding: Encoding, connection_id: ConnectionId) -> Option<WireFrame> {
    let data = match encode(message, encoding) {
        Ok(data) => data,
        Err(e) => {
            warn!(connection = %connection_id, "Encode failed, message skipped: {}", e);
            return None;
        }
    };
    if !encoding.is_text() {
        return Some(WireFrame::Binary(data));
    }
    match String::from_utf8(data.to_vec()) {
        Ok(text) => Some(WireFrame::Text(text)),
        Err(e) => {
            warn!(connection = %connection_id, "Encoded JSON is not UTF-8: {}", e);
            None
        }
    }
}
