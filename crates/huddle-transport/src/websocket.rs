//! WebSocket transport over axum's upgraded sockets.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::trace;

use crate::traits::{FrameReader, FrameWriter, TransportError, WireFrame};

/// Reading half of an upgraded WebSocket.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
}

/// Writing half of an upgraded WebSocket.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
}

/// Split an upgraded socket into pump halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketWriter, WebSocketReader) {
    let (sink, stream) = socket.split();
    (WebSocketWriter { sink }, WebSocketReader { stream })
}

fn from_ws(message: Message) -> WireFrame {
    match message {
        Message::Text(text) => WireFrame::Text(text),
        Message::Binary(data) => WireFrame::Binary(Bytes::from(data)),
        Message::Ping(data) => WireFrame::Ping(Bytes::from(data)),
        Message::Pong(data) => WireFrame::Pong(Bytes::from(data)),
        Message::Close(_) => WireFrame::Close,
    }
}

fn to_ws(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(data) => Message::Binary(data.to_vec()),
        WireFrame::Ping(data) => Message::Ping(data.to_vec()),
        WireFrame::Pong(data) => Message::Pong(data.to_vec()),
        WireFrame::Close => Message::Close(None),
    }
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(Some(from_ws(message))),
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            None => {
                trace!("WebSocket stream ended");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        self.sink
            .send(to_ws(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
