//! Realtime order feed
//!
//! Length-prefixed frames over TCP (or an in-process channel pair) carry
//! order events from the order service. A background read loop fans
//! frames out to subscribers; `forward_orders` routes decoded events
//! straight into an [`OrderSync`] collection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shared::message::{
    EventType, FeedMessage, HandshakePayload, MAX_PAYLOAD_SIZE, OrderEvent, PROTOCOL_VERSION,
};

use crate::sync::OrderSync;
use crate::{ClientConfig, ClientError};

/// Feed transport errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl From<FeedError> for ClientError {
    fn from(err: FeedError) -> Self {
        ClientError::Feed(err.to_string())
    }
}

/// Transport abstraction for feed communication
#[async_trait]
pub trait FeedTransport: Send + Sync + std::fmt::Debug {
    async fn read_message(&self) -> Result<FeedMessage, FeedError>;
    async fn write_message(&self, msg: &FeedMessage) -> Result<(), FeedError>;
    async fn close(&self) -> Result<(), FeedError>;
}

// ========== TCP Transport ==========

/// TCP transport. Frame layout: event type (1 byte), message id
/// (16 bytes), payload length (4 bytes LE), payload.
#[derive(Debug, Clone)]
pub struct TcpFeedTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpFeedTransport {
    pub async fn connect(addr: &str) -> Result<Self, FeedError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

/// Drain `len` payload bytes of a frame that will not be delivered.
async fn discard_payload(reader: &mut OwnedReadHalf, len: usize) -> Result<(), FeedError> {
    let mut limited = (&mut *reader).take(len as u64);
    let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink())
        .await
        .map_err(FeedError::Io)?;
    if copied != len as u64 {
        return Err(FeedError::Connection("Connection closed mid frame".into()));
    }
    Ok(())
}

#[async_trait]
impl FeedTransport for TcpFeedTransport {
    async fn read_message(&self) -> Result<FeedMessage, FeedError> {
        let mut reader = self.reader.lock().await;

        // Unknown and oversized frames are skipped, not fatal, so one
        // newer service build cannot take the whole feed down
        loop {
            // Read event type (1 byte)
            let mut type_buf = [0u8; 1];
            reader
                .read_exact(&mut type_buf)
                .await
                .map_err(FeedError::Io)?;

            // Read message id (16 bytes)
            let mut id_buf = [0u8; 16];
            reader
                .read_exact(&mut id_buf)
                .await
                .map_err(FeedError::Io)?;

            // Read payload length (4 bytes)
            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .await
                .map_err(FeedError::Io)?;
            let len = u32::from_le_bytes(len_buf) as usize;

            if len > MAX_PAYLOAD_SIZE {
                tracing::warn!(len, max = MAX_PAYLOAD_SIZE, "Oversized feed frame discarded");
                discard_payload(&mut reader, len).await?;
                continue;
            }

            let Ok(event_type) = EventType::try_from(type_buf[0]) else {
                tracing::warn!(raw = type_buf[0], "Unknown feed event type; frame skipped");
                discard_payload(&mut reader, len).await?;
                continue;
            };

            // Read payload
            let mut payload = vec![0u8; len];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(FeedError::Io)?;

            return Ok(FeedMessage {
                message_id: Uuid::from_bytes(id_buf),
                event_type,
                payload,
            });
        }
    }

    async fn write_message(&self, msg: &FeedMessage) -> Result<(), FeedError> {
        if msg.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FeedError::InvalidFrame(format!(
                "Payload of {} bytes exceeds limit of {MAX_PAYLOAD_SIZE}",
                msg.payload.len()
            )));
        }

        let mut writer = self.writer.lock().await;
        let mut data = Vec::new();
        data.push(msg.event_type as u8);
        data.extend_from_slice(msg.message_id.as_bytes());
        data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&msg.payload);

        writer.write_all(&data).await.map_err(FeedError::Io)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), FeedError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(FeedError::Io)
    }
}

// ========== Memory Transport ==========

/// In-process transport for tests and embedded setups
#[derive(Debug, Clone)]
pub struct MemoryFeedTransport {
    /// Receiver for frames FROM the order service
    rx: Arc<Mutex<broadcast::Receiver<FeedMessage>>>,
    /// Sender for frames TO the order service
    tx: broadcast::Sender<FeedMessage>,
}

impl MemoryFeedTransport {
    pub fn new(
        service_tx: &broadcast::Sender<FeedMessage>,
        client_tx: &broadcast::Sender<FeedMessage>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(service_tx.subscribe())),
            tx: client_tx.clone(),
        }
    }
}

#[async_trait]
impl FeedTransport for MemoryFeedTransport {
    async fn read_message(&self) -> Result<FeedMessage, FeedError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Feed receiver lagged; frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(FeedError::Connection("Memory channel closed".into()));
                }
            }
        }
    }

    async fn write_message(&self, msg: &FeedMessage) -> Result<(), FeedError> {
        self.tx
            .send(msg.clone())
            .map_err(|e| FeedError::Connection(format!("Failed to send to service: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), FeedError> {
        Ok(())
    }
}

// ========== Feed Client ==========

/// Feed client
///
/// Introduces itself with a handshake on connect, then fans incoming
/// frames out to every subscriber. There is no automatic reconnect; the
/// owner decides when and whether to dial again.
#[derive(Debug, Clone)]
pub struct FeedClient {
    transport: Arc<dyn FeedTransport>,
    event_tx: broadcast::Sender<FeedMessage>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl FeedClient {
    /// Connect via TCP and perform the handshake.
    pub async fn connect(addr: &str, client_name: &str) -> Result<Self, FeedError> {
        let transport = Arc::new(TcpFeedTransport::connect(addr).await?);

        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some(client_name.to_string()),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            client_id: None, // Let the service assign one
        };
        transport
            .write_message(&FeedMessage::handshake(&payload))
            .await?;

        tracing::info!(addr, "Feed connected");
        Ok(Self::with_transport(transport))
    }

    /// Connect using the feed address and client name of a config.
    pub async fn from_config(config: &ClientConfig) -> Result<Self, FeedError> {
        let addr = config
            .feed_addr
            .as_deref()
            .ok_or_else(|| FeedError::Connection("No feed address configured".to_string()))?;
        Self::connect(addr, &config.client_name).await
    }

    /// Create an in-process client over a channel pair.
    pub fn memory(
        service_tx: &broadcast::Sender<FeedMessage>,
        client_tx: &broadcast::Sender<FeedMessage>,
    ) -> Self {
        Self::with_transport(Arc::new(MemoryFeedTransport::new(service_tx, client_tx)))
    }

    /// Create a client over any transport, spawning the read loop.
    pub fn with_transport(transport: Arc<dyn FeedTransport>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        let client = Self {
            transport: transport.clone(),
            event_tx: event_tx.clone(),
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        };

        // Read loop: frames fan out to every subscriber until the
        // connection drops or the client shuts down
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = transport.read_message() => match result {
                        Ok(msg) => {
                            if let Err(e) = event_tx.send(msg) {
                                tracing::debug!("No subscribers for feed event: {e}");
                            }
                        }
                        Err(e) => {
                            tracing::error!("Feed read error: {e}");
                            break;
                        }
                    }
                }
            }
            connected.store(false, Ordering::Release);
        });

        client
    }

    /// Subscribe to incoming feed messages.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.event_tx.subscribe()
    }

    /// Send a message to the order service.
    pub async fn send(&self, msg: &FeedMessage) -> Result<(), FeedError> {
        self.transport.write_message(msg).await
    }

    /// Spawn a task that decodes order events and applies them to the
    /// given collection. Undecodable frames are skipped with a warning;
    /// everything else flows through the collection's own idempotent
    /// entry points, so replays and echoes of local mutations are safe.
    pub fn forward_orders(&self, sync: OrderSync) -> JoinHandle<()> {
        let mut rx = self.event_tx.subscribe();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(msg) => match OrderEvent::from_message(&msg) {
                            Ok(Some(event)) => {
                                tracing::debug!(order_id = event.order_id(), "Feed event applied");
                                sync.apply_event(event);
                            }
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(
                                    message_id = %msg.message_id,
                                    event_type = %msg.event_type,
                                    error = %err,
                                    "Undecodable order event skipped"
                                );
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Order event forwarding lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Whether the read loop is still attached to the service.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stop the read loop and close the transport.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(err) = self.transport.close().await {
            tracing::debug!(error = %err, "Feed transport close failed");
        }
        self.connected.store(false, Ordering::Release);
        tracing::info!("Feed client shut down");
    }
}
