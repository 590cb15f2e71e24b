//! Error types for lingostream.

use crate::lang::LanguageCode;
use thiserror::Error;

/// Invalid or contradictory session configuration.
///
/// Always surfaced before anything connects; nothing has started when
/// one of these is returned.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one target language is required")]
    NoTargets,

    #[error("duplicate target language: {0}")]
    DuplicateTarget(LanguageCode),

    #[error("chunk duration {0} ms outside supported range 10-40 ms")]
    ChunkDurationOutOfRange(u32),

    #[error("queue thresholds for {lang}: desired {desired} ms exceeds max {max} ms")]
    QueueThresholds {
        lang: LanguageCode,
        desired: u32,
        max: u32,
    },

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Transport failed to establish.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("websocket connect failed: {0}")]
    WebSocket(String),

    #[error("nats connect failed: {0}")]
    Nats(String),

    #[error("transport handshake failed: {0}")]
    Handshake(String),
}

/// A single outbound frame or control message failed to send.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("transport closed")]
    Closed,

    #[error("send failed: {0}")]
    Transport(String),
}

/// A source adapter failed to produce audio.
#[derive(Error, Debug)]
#[error("reader error: {message}")]
pub struct ReaderError {
    pub message: String,
}

impl ReaderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// A sink adapter failed to accept audio.
#[derive(Error, Debug)]
#[error("write error: {message}")]
pub struct WriteError {
    pub message: String,
}

impl WriteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Top-level session failure reported to the caller.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("session is {state}, expected Idle")]
    NotIdle { state: String },

    #[error("transport failed: {0}")]
    Transport(String),
}
