//! Frame transports
//!
//! A connection reads and writes whole text frames. The WebSocket transport is
//! what clients use; the in-memory transport serves tests and in-process
//! clients.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The underlying connection failed
    #[error("transport i/o error: {0}")]
    Io(String),

    /// A frame arrived that cannot be a protocol message
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The transport is already closed
    #[error("transport closed")]
    Closed,
}

/// Read half of a transport
#[async_trait]
pub trait FrameReader: Send {
    /// Read the next text frame
    ///
    /// `Ok(None)` means the peer closed the connection. Must be cancel-safe.
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// Write half of a transport
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one text frame
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Both halves of a client connection plus its remote address
pub struct Transport {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
    pub addr: String,
}

impl Transport {
    /// Wrap arbitrary halves
    pub fn new(
        reader: impl FrameReader + 'static,
        writer: impl FrameWriter + 'static,
        addr: impl Into<String>,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            addr: addr.into(),
        }
    }

    /// Wrap an upgraded axum WebSocket
    pub fn websocket(socket: WebSocket, addr: impl Into<String>) -> Self {
        let (sink, stream) = socket.split();
        Self::new(WsReader { stream }, WsWriter { sink }, addr)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebSocket
// ============================================================================

struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(_))) => {
                    return Err(TransportError::InvalidFrame(
                        "binary frames are not supported".to_string(),
                    ))
                }
                // Pong is handled automatically by axum
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}

struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

// ============================================================================
// In-memory
// ============================================================================

type InboundFrame = Result<String, TransportError>;

/// In-memory transport pair
pub struct MemoryTransport;

impl MemoryTransport {
    /// Create a server-side transport and the peer driving it
    ///
    /// Each direction buffers up to `capacity` frames.
    pub fn pair(capacity: usize) -> (Transport, MemoryPeer) {
        let capacity = capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        let transport = Transport::new(
            MemoryReader { rx: inbound_rx },
            MemoryWriter {
                tx: Some(outbound_tx),
            },
            "memory",
        );
        let peer = MemoryPeer {
            tx: Some(inbound_tx),
            rx: outbound_rx,
        };
        (transport, peer)
    }
}

struct MemoryReader {
    rx: mpsc::Receiver<InboundFrame>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

struct MemoryWriter {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx.take();
        Ok(())
    }
}

/// Client end of an in-memory transport
#[derive(Debug)]
pub struct MemoryPeer {
    tx: Option<mpsc::Sender<InboundFrame>>,
    rx: mpsc::Receiver<String>,
}

impl MemoryPeer {
    /// Send a text frame to the server
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.inject(Ok(frame.into())).await
    }

    /// Deliver a transport-level error to the server's reader
    pub async fn inject_error(&self, error: TransportError) -> Result<(), TransportError> {
        self.inject(Err(error)).await
    }

    async fn inject(&self, frame: InboundFrame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Receive the next frame written by the server
    ///
    /// `None` once the server closed the transport.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Receive a frame if one is already buffered
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Close the client side; the server reads end-of-stream
    pub fn close(&mut self) {
        self.tx.take();
    }
}
