//! WebSocket transport binding.
//!
//! One socket carries both sub-channels as JSON envelopes. A single writer
//! task serializes every outbound send; a reader task decodes inbound
//! payloads into the event channel.

use super::{event_from_message, Transport, TransportEvent, INBOUND_BUFFER};
use crate::error::{ConnectError, SendError};
use crate::message::{AudioFormat, AudioFrame, ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Outbound channel capacity; a full channel is the pump's backpressure
/// suspension point.
const OUTBOUND_BUFFER: usize = 64;

pub struct WsTransport {
    out_tx: mpsc::Sender<Message>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    close_tx: watch::Sender<bool>,
}

impl WsTransport {
    /// Connect to the service's WebSocket endpoint.
    pub async fn connect(
        url: &str,
        token: &str,
        format: AudioFormat,
    ) -> Result<Self, ConnectError> {
        let dsn = format!("{url}?token={token}");
        info!("Connecting to translation service at {}", url);

        let (stream, _response) = tokio_tungstenite::connect_async(&dsn)
            .await
            .map_err(|e| ConnectError::WebSocket(e.to_string()))?;
        info!("WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(INBOUND_BUFFER);
        let (close_tx, close_rx) = watch::channel(false);

        // Writer task: the only place that touches the sink, so concurrent
        // sends from the pump and the governors are serialized here.
        let mut writer_close = close_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_close.changed() => break,
                    item = out_rx.recv() => {
                        let Some(msg) = item else { break };
                        if let Err(e) = sink.send(msg).await {
                            warn!("WebSocket send failed: {}", e);
                            break;
                        }
                    }
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            debug!("WebSocket writer task stopped");
        });

        // Reader task: decode inbound payloads into the event channel.
        let mut reader_close = close_rx;
        tokio::spawn(async move {
            loop {
                let raw = tokio::select! {
                    _ = reader_close.changed() => break,
                    item = source.next() => item,
                };
                let Some(raw) = raw else { break };
                let text = match raw {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Dropping non-UTF8 binary payload");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue, // ping/pong handled by the library
                    Err(e) => {
                        warn!("WebSocket receive failed: {}", e);
                        break;
                    }
                };
                match ServerMessage::decode(&text) {
                    Ok(msg) => {
                        let event = event_from_message(msg, format);
                        if event_tx.send(event).await.is_err() {
                            break; // consumer gone
                        }
                    }
                    Err(e) => warn!("Dropping malformed message: {}", e),
                }
            }
            debug!("WebSocket reader task stopped");
            // event_tx drops here, ending the inbound sequence
        });

        Ok(Self {
            out_tx,
            events: Some(event_rx),
            close_tx,
        })
    }

    async fn send(&self, json: String) -> Result<(), SendError> {
        if *self.close_tx.borrow() {
            return Err(SendError::Closed);
        }
        self.out_tx
            .send(Message::Text(json))
            .await
            .map_err(|_| SendError::Closed)
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send_media(&self, frame: AudioFrame) -> Result<(), SendError> {
        let msg = ClientMessage::InputAudioData {
            sequence: frame.sequence,
            pcm: frame.pcm,
        };
        self.send(msg.to_json()).await
    }

    async fn send_control(&self, msg: ClientMessage) -> Result<(), SendError> {
        self.send(msg.to_json()).await
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    async fn close(&self) {
        // Idempotent: the watch value only ever moves false -> true.
        if !*self.close_tx.borrow() {
            let _ = self.close_tx.send(true);
            debug!("WebSocket transport closed");
        }
    }
}
