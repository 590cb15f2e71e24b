//! Abstract transport to the translation service.
//!
//! A transport is one logical connection carrying two sub-channels: a media
//! channel for audio frames (lowest latency) and a control channel for
//! structured messages. The two concrete bindings — WebSocket and NATS —
//! satisfy the same contract; the engine never depends on either directly.

pub mod nats;
pub mod ws;

pub use nats::NatsTransport;
pub use ws::WsTransport;

use crate::error::{ConnectError, SendError};
use crate::message::{AudioFormat, AudioFrame, ClientMessage, ServerMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Inbound events produced by a transport until it closes.
#[derive(Debug)]
pub enum TransportEvent {
    /// A translated audio frame, tagged with its target language
    Media(AudioFrame),
    /// A structured control-channel message
    Control(ServerMessage),
}

/// Capacity of the inbound event channel. Inbound decode applies
/// backpressure to the socket once this fills.
pub(crate) const INBOUND_BUFFER: usize = 256;

/// One logical connection to the service.
///
/// Send methods take `&self` and are safe to call concurrently from the
/// input pump and the queue governors; implementations serialize at that
/// boundary. The event stream is lazy, infinite until close, and can be
/// taken exactly once.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one audio frame on the media sub-channel.
    async fn send_media(&self, frame: AudioFrame) -> Result<(), SendError>;

    /// Send one structured message on the control sub-channel.
    async fn send_control(&self, msg: ClientMessage) -> Result<(), SendError>;

    /// Take the inbound event stream. Returns `None` on second call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Close both sub-channels and release transport resources. Idempotent.
    async fn close(&self);
}

/// Where and how to reach the service. The caller supplies an
/// already-authenticated configuration; credential negotiation happens
/// upstream of this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Single WebSocket carrying JSON envelopes both ways
    WebSocket { url: String, token: String },
    /// NATS subjects, one per sub-channel and direction
    Nats { url: String, subject_prefix: String },
}

/// Opens transports. The session manager owns one of these so tests can
/// substitute a scripted transport.
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError>;
}

/// Default connector backed by [`TransportConfig`].
pub struct NetConnector {
    config: TransportConfig,
    format: AudioFormat,
}

impl NetConnector {
    pub fn new(config: TransportConfig, format: AudioFormat) -> Self {
        Self { config, format }
    }
}

#[async_trait::async_trait]
impl TransportConnector for NetConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        connect(&self.config, self.format).await
    }
}

/// Open a transport for `config`.
pub async fn connect(
    config: &TransportConfig,
    format: AudioFormat,
) -> Result<Box<dyn Transport>, ConnectError> {
    match config {
        TransportConfig::WebSocket { url, token } => {
            let transport = WsTransport::connect(url, token, format).await?;
            Ok(Box::new(transport))
        }
        TransportConfig::Nats {
            url,
            subject_prefix,
        } => {
            let transport = NatsTransport::connect(url, subject_prefix, format).await?;
            Ok(Box::new(transport))
        }
    }
}

/// Map a decoded inbound message to an event, lifting audio payloads onto
/// the media sub-channel. Shared by both bindings.
pub(crate) fn event_from_message(msg: ServerMessage, format: AudioFormat) -> TransportEvent {
    match msg {
        ServerMessage::OutputAudioData {
            target_language: Some(lang),
            sequence,
            pcm,
        } => TransportEvent::Media(AudioFrame {
            pcm,
            sample_rate: format.sample_rate,
            channels: format.channels,
            sequence,
            source: crate::message::SourceTag::Target(lang),
        }),
        // Untagged audio cannot be routed; let the dispatcher count it.
        other => TransportEvent::Control(other),
    }
}
