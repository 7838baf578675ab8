//! WebSocket signaling channel for one room

use super::protocol::{InboundMessage, OutboundMessage};
use crate::session::SessionEvent;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Outbound half of the signaling channel as seen by the session
#[async_trait]
pub trait SignalingSink: Send + Sync {
    /// Send one message; dropped silently when the transport is not open
    fn send(&self, msg: &OutboundMessage);

    /// Best-effort `bye`, then close the transport
    async fn close(&self);
}

/// WebSocket connection to `{server}/ws/{room_id}`
///
/// Inbound frames are parsed once and pushed into the session queue in
/// arrival order. Transport closure is reported once as
/// [`SessionEvent::ChannelClosed`]; there is no reconnect.
pub struct SignalingChannel {
    /// Room socket URL
    url: url::Url,

    /// Outgoing frame queue drained by the sender task
    tx: mpsc::UnboundedSender<Message>,

    /// Whether the transport is open for sending
    open: Arc<AtomicBool>,

    /// Sender task, awaited on close so the close frame is flushed
    sender: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingChannel {
    /// Connect to a room socket and start forwarding inbound messages
    pub async fn connect(url: url::Url, events: mpsc::UnboundedSender<SessionEvent>) -> Result<Self> {
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let sender = tokio::spawn(Self::sender_task(write, rx, Arc::clone(&open)));
        tokio::spawn(Self::receiver_task(read, events, Arc::clone(&open)));

        Ok(Self {
            url,
            tx,
            open,
            sender: Mutex::new(Some(sender)),
        })
    }

    /// Room socket URL
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Sender task: writes queued frames until a close frame or a write error
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
        open: Arc<AtomicBool>,
    ) {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                open.store(false, Ordering::SeqCst);
                break;
            }
            if is_close {
                break;
            }
        }

        debug!("Sender task terminated");
    }

    /// Receiver task: parses frames and forwards them to the session
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        events: mpsc::UnboundedSender<SessionEvent>,
        open: Arc<AtomicBool>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    debug!("Received signaling message: {}", text);
                    let msg = match InboundMessage::parse(&text) {
                        InboundMessage::Malformed { reason } => {
                            warn!("Dropping malformed signaling frame: {}", reason);
                            continue;
                        }
                        msg => msg,
                    };
                    if events.send(SessionEvent::Signal(msg)).is_err() {
                        debug!("Session gone, stopping receiver");
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("WebSocket connection closed: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        open.store(false, Ordering::SeqCst);
        // The session may already be gone after a hangup
        let _ = events.send(SessionEvent::ChannelClosed);
        debug!("Receiver task terminated");
    }
}

#[async_trait]
impl SignalingSink for SignalingChannel {
    fn send(&self, msg: &OutboundMessage) {
        if !self.is_open() {
            debug!("Signaling channel not open, dropping {:?}", msg);
            return;
        }

        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode signaling message: {}", e);
                return;
            }
        };
        debug!("Sending signaling message: {}", json);

        if self.tx.send(Message::Text(json)).is_err() {
            debug!("Sender task gone, dropping message");
        }
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Ok(json) = OutboundMessage::Bye.to_json() {
                let _ = self.tx.send(Message::Text(json));
            }
            let _ = self.tx.send(Message::Close(None));
        }

        if let Some(sender) = self.sender.lock().await.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sender).await.is_err() {
                warn!("Timed out flushing signaling close frame");
            }
        }
    }
}
