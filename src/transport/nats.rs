//! NATS transport binding.
//!
//! Sub-channels map to subjects under a session prefix: media and control
//! each get their own subject per direction. Payloads are the same JSON
//! envelopes the WebSocket binding uses.

use super::{event_from_message, Transport, TransportEvent, INBOUND_BUFFER};
use crate::error::{ConnectError, SendError};
use crate::message::{AudioFormat, AudioFrame, ClientMessage, ServerMessage};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct NatsTransport {
    client: async_nats::Client,
    media_subject: String,
    control_subject: String,
    events: Option<mpsc::Receiver<TransportEvent>>,
    close_tx: watch::Sender<bool>,
}

impl NatsTransport {
    /// Connect to a NATS server and subscribe to the session's inbound
    /// subjects.
    pub async fn connect(
        url: &str,
        subject_prefix: &str,
        format: AudioFormat,
    ) -> Result<Self, ConnectError> {
        info!("Connecting to NATS at {}", url);
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ConnectError::Nats(e.to_string()))?;
        info!("Connected to NATS");

        let media_out = format!("{subject_prefix}.audio.out");
        let control_out = format!("{subject_prefix}.control.out");
        let media_sub = client
            .subscribe(media_out)
            .await
            .map_err(|e| ConnectError::Nats(e.to_string()))?;
        let control_sub = client
            .subscribe(control_out)
            .await
            .map_err(|e| ConnectError::Nats(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(INBOUND_BUFFER);
        let (close_tx, close_rx) = watch::channel(false);

        // Both subjects feed one event stream; per-subject ordering is
        // preserved, cross-subject ordering is not guaranteed (and not
        // required by the routing layer).
        for mut sub in [media_sub, control_sub] {
            let event_tx = event_tx.clone();
            let mut close_rx = close_rx.clone();
            tokio::spawn(async move {
                loop {
                    let item = tokio::select! {
                        _ = close_rx.changed() => break,
                        item = sub.next() => item,
                    };
                    let Some(nats_msg) = item else { break };
                    let text = match std::str::from_utf8(&nats_msg.payload) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Dropping non-UTF8 payload on {}", nats_msg.subject);
                            continue;
                        }
                    };
                    match ServerMessage::decode(text) {
                        Ok(msg) => {
                            let event = event_from_message(msg, format);
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed message: {}", e),
                    }
                }
                debug!("NATS subscriber task stopped");
            });
        }

        Ok(Self {
            client,
            media_subject: format!("{subject_prefix}.audio.in"),
            control_subject: format!("{subject_prefix}.control.in"),
            events: Some(event_rx),
            close_tx,
        })
    }

    async fn publish(&self, subject: String, json: String) -> Result<(), SendError> {
        if *self.close_tx.borrow() {
            return Err(SendError::Closed);
        }
        self.client
            .publish(subject, json.into_bytes().into())
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn send_media(&self, frame: AudioFrame) -> Result<(), SendError> {
        let msg = ClientMessage::InputAudioData {
            sequence: frame.sequence,
            pcm: frame.pcm,
        };
        self.publish(self.media_subject.clone(), msg.to_json()).await
    }

    async fn send_control(&self, msg: ClientMessage) -> Result<(), SendError> {
        self.publish(self.control_subject.clone(), msg.to_json())
            .await
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    async fn close(&self) {
        if !*self.close_tx.borrow() {
            let _ = self.close_tx.send(true);
            if let Err(e) = self.client.flush().await {
                warn!("NATS flush on close failed: {}", e);
            }
            debug!("NATS transport closed");
        }
    }
}
