//! Transport seam
//!
//! The client only sees the `TransportSink`/`TransportStream` pair, so the
//! tungstenite socket can be swapped for a scripted mock in tests. The
//! WebSocket implementation splits the stream the same way the venue feeds
//! do and maps frames 1:1.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use services_common::{FeedError, FeedResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Handshake deadline for new connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One full-duplex message, transport-agnostic
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Transport-level ping
    Ping(Vec<u8>),
    /// Transport-level pong
    Pong(Vec<u8>),
    /// Close frame
    Close,
}

impl WireMessage {
    /// Payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close => 0,
        }
    }

    /// True for zero-length payloads
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write half of a venue connection
#[async_trait]
pub trait TransportSink: Send {
    /// Write one message
    async fn send(&mut self, msg: WireMessage) -> FeedResult<()>;

    /// Initiate a graceful close
    async fn close(&mut self) -> FeedResult<()>;
}

/// Read half of a venue connection
#[async_trait]
pub trait TransportStream: Send {
    /// Await the next inbound message; `None` means the peer closed
    async fn recv(&mut self) -> Option<FeedResult<WireMessage>>;
}

/// Factory opening transports for a URL
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and split it into halves
    async fn connect(
        &self,
        url: &str,
    ) -> FeedResult<(Box<dyn TransportSink>, Box<dyn TransportStream>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector over tokio-tungstenite with TLS
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> FeedResult<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        url::Url::parse(url)
            .map_err(|e| FeedError::Transport(format!("invalid url {url}: {e}")))?;
        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| FeedError::Transport(format!("handshake timed out: {url}")))?
            .map_err(|e| FeedError::Transport(format!("handshake failed: {e}")))?;
        debug!(url, status = %response.status(), "websocket connected");
        let (sink, stream) = stream.split();
        Ok((
            Box::new(WsSink { inner: sink }),
            Box::new(WsRecv { inner: stream }),
        ))
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, msg: WireMessage) -> FeedResult<()> {
        let frame = match msg {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data),
            WireMessage::Ping(data) => Message::Ping(data),
            WireMessage::Pong(data) => Message::Pong(data),
            WireMessage::Close => Message::Close(None),
        };
        self.inner
            .send(frame)
            .await
            .map_err(|e| FeedError::Transport(format!("send failed: {e}")))
    }

    async fn close(&mut self) -> FeedResult<()> {
        self.inner
            .send(Message::Close(None))
            .await
            .map_err(|e| FeedError::Transport(format!("close failed: {e}")))
    }
}

struct WsRecv {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsRecv {
    async fn recv(&mut self) -> Option<FeedResult<WireMessage>> {
        loop {
            let frame = match self.inner.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(FeedError::Transport(format!("recv failed: {e}")))),
            };
            let msg = match frame {
                Message::Text(text) => WireMessage::Text(text),
                Message::Binary(data) => WireMessage::Binary(data),
                Message::Ping(data) => WireMessage::Ping(data),
                Message::Pong(data) => WireMessage::Pong(data),
                Message::Close(_) => WireMessage::Close,
                // Raw frames never surface from a read
                Message::Frame(_) => continue,
            };
            return Some(Ok(msg));
        }
    }
}
