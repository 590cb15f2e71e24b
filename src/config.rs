//! Session configuration.
//!
//! A [`SessionConfig`] names one source language with its `Reader` and any
//! number of target languages, each with an optional `Writer`, an optional
//! transcription callback, and a queue policy. The pipeline blocks
//! (`Preprocessing`, `Transcription`, `Translation`) are passed through to
//! the service verbatim; the engine itself only interprets the queue
//! configuration.

use crate::adapter::{Reader, Writer};
use crate::error::ConfigError;
use crate::lang::LanguageCode;
use crate::message::{AudioFormat, TranscriptionEvent};
use crate::transport::TransportConfig;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Message types the engine asks the service to deliver.
pub const ALLOWED_MESSAGE_TYPES: &[&str] = &[
    "translated_transcription",
    "partial_translated_transcription",
    "partial_transcription",
    "validated_transcription",
    "pipeline_timings",
];

/// A transcription callback, either run inline (blocking the router for
/// its own bounded duration) or scheduled as a task without being awaited.
#[derive(Clone)]
pub enum TranscriptionCallback {
    /// Runs inline on the router task. Must not perform blocking I/O.
    Blocking(Arc<dyn Fn(TranscriptionEvent) + Send + Sync>),
    /// Spawned per event; the router does not await completion.
    Scheduled(Arc<dyn Fn(TranscriptionEvent) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl TranscriptionCallback {
    pub fn blocking(f: impl Fn(TranscriptionEvent) + Send + Sync + 'static) -> Self {
        Self::Blocking(Arc::new(f))
    }

    pub fn scheduled<F, Fut>(f: F) -> Self
    where
        F: Fn(TranscriptionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Scheduled(Arc::new(move |event| Box::pin(f(event))))
    }
}

impl std::fmt::Debug for TranscriptionCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("TranscriptionCallback::Blocking"),
            Self::Scheduled(_) => f.write_str("TranscriptionCallback::Scheduled"),
        }
    }
}

/// Voice-activity-detection and input conditioning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessing {
    pub enable_vad: bool,
    pub vad_threshold: f64,
    pub vad_left_padding: u32,
    pub vad_right_padding: u32,
    pub pre_vad_denoise: bool,
    pub pre_vad_dsp: bool,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            enable_vad: true,
            vad_threshold: 0.5,
            vad_left_padding: 1,
            vad_right_padding: 1,
            pre_vad_denoise: false,
            pre_vad_dsp: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterAdvanced {
    pub min_sentence_characters: u32,
    pub min_sentence_seconds: u32,
    pub min_split_interval: f64,
    pub context_size: u32,
    pub step_size: u32,
}

impl Default for SplitterAdvanced {
    fn default() -> Self {
        Self {
            min_sentence_characters: 80,
            min_sentence_seconds: 4,
            min_split_interval: 0.6,
            context_size: 30,
            step_size: 5,
        }
    }
}

/// Sentence-splitter tuning for the transcription stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Splitter {
    pub enabled: bool,
    pub splitter_model: String,
    pub advanced: SplitterAdvanced,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            enabled: true,
            splitter_model: "auto".to_string(),
            advanced: SplitterAdvanced::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub verification_model: String,
    pub allow_verification_glossaries: bool,
    pub auto_transcription_correction: bool,
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            verification_model: "auto".to_string(),
            allow_verification_glossaries: true,
            auto_transcription_correction: false,
        }
    }
}

/// ASR stage options, passed through to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default = "auto_model")]
    pub asr_model: String,
    #[serde(default = "no_denoise")]
    pub denoise: String,
    #[serde(default)]
    pub sentence_splitter: Splitter,
    #[serde(default)]
    pub verification: Verification,
}

impl Default for Transcription {
    fn default() -> Self {
        Self {
            asr_model: auto_model(),
            denoise: no_denoise(),
            sentence_splitter: Splitter::default(),
            verification: Verification::default(),
        }
    }
}

fn auto_model() -> String {
    "auto".to_string()
}

fn no_denoise() -> String {
    "none".to_string()
}

/// TTS stage options, passed through to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechGen {
    pub tts_model: String,
    pub voice_cloning: bool,
    pub voice_cloning_mode: String,
    pub voice_id: String,
    pub speech_tempo_auto: bool,
    pub speech_tempo_adjustment_factor: f64,
}

impl Default for SpeechGen {
    fn default() -> Self {
        Self {
            tts_model: "auto".to_string(),
            voice_cloning: false,
            voice_cloning_mode: "static_10".to_string(),
            voice_id: "default_low".to_string(),
            speech_tempo_auto: true,
            speech_tempo_adjustment_factor: 0.75,
        }
    }
}

/// Per-target translation block, passed through to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub translation_model: String,
    pub allow_translation_glossaries: bool,
    pub translate_partial_transcriptions: bool,
    pub speech_generation: SpeechGen,
}

impl Default for Translation {
    fn default() -> Self {
        Self {
            translation_model: "auto".to_string(),
            allow_translation_glossaries: true,
            translate_partial_transcriptions: false,
            speech_generation: SpeechGen::default(),
        }
    }
}

/// Buffered-audio thresholds driving the queue governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Buffered milliseconds the pipeline aims to hold
    pub desired_queue_level_ms: u32,
    /// Buffered milliseconds above which synthesis must slow down
    pub max_queue_level_ms: u32,
    /// When false, the governor accounts but never signals
    pub auto_tempo: bool,
    /// Tempo sent on a slow-down directive (1.0 = normal speed)
    #[serde(default = "default_slowdown_tempo", skip_serializing)]
    pub slowdown_tempo: f64,
}

fn default_slowdown_tempo() -> f64 {
    0.8
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            desired_queue_level_ms: 8000,
            max_queue_level_ms: 24000,
            auto_tempo: false,
            slowdown_tempo: default_slowdown_tempo(),
        }
    }
}

/// The session's source language: where audio comes from and what to do
/// with source-side transcriptions.
pub struct SourceLang {
    pub lang: LanguageCode,
    pub transcription: Transcription,
    pub(crate) reader: Box<dyn Reader>,
    pub(crate) on_transcription: Option<TranscriptionCallback>,
}

impl SourceLang {
    pub fn new(lang: impl Into<LanguageCode>, reader: impl Reader + 'static) -> Self {
        Self {
            lang: lang.into(),
            transcription: Transcription::default(),
            reader: Box::new(reader),
            on_transcription: None,
        }
    }

    pub fn with_callback(mut self, callback: TranscriptionCallback) -> Self {
        self.on_transcription = Some(callback);
        self
    }

    pub fn with_transcription(mut self, transcription: Transcription) -> Self {
        self.transcription = transcription;
        self
    }
}

/// One target language: its translation settings, optional audio sink,
/// optional transcription callback, and queue policy. Immutable once the
/// session starts; uniquely keyed by language within a session.
pub struct TargetLang {
    pub lang: LanguageCode,
    pub translation: Translation,
    /// Overrides the session-wide queue config when set
    pub queue: Option<QueueConfig>,
    pub(crate) writer: Option<Box<dyn Writer>>,
    pub(crate) on_transcription: Option<TranscriptionCallback>,
}

impl TargetLang {
    pub fn new(lang: impl Into<LanguageCode>) -> Self {
        Self {
            lang: lang.into(),
            translation: Translation::default(),
            queue: None,
            writer: None,
            on_transcription: None,
        }
    }

    pub fn with_writer(mut self, writer: impl Writer + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn with_callback(mut self, callback: TranscriptionCallback) -> Self {
        self.on_transcription = Some(callback);
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_translation(mut self, translation: Translation) -> Self {
        self.translation = translation;
        self
    }
}

/// Full configuration for one translation session.
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,
    pub transport: TransportConfig,
    pub source: SourceLang,
    pub targets: Vec<TargetLang>,
    /// Fixed PCM format across all adapters in this session
    pub format: AudioFormat,
    /// Duration of each media frame sent to the service (10-40 ms)
    pub chunk_duration_ms: u32,
    /// How long draining may take before routers are forced to finish
    pub drain_timeout: Duration,
    /// When true, any adapter failure stops the whole session
    pub fail_fast: bool,
    pub preprocessing: Preprocessing,
    /// Session-wide queue policy; targets may override individually
    pub queue: QueueConfig,
}

impl SessionConfig {
    pub fn new(transport: TransportConfig, source: SourceLang, targets: Vec<TargetLang>) -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            transport,
            source,
            targets,
            format: AudioFormat::default(),
            chunk_duration_ms: 20,
            drain_timeout: Duration::from_secs(30),
            fail_fast: false,
            preprocessing: Preprocessing::default(),
            queue: QueueConfig::default(),
        }
    }

    /// Apply engine settings loaded from a config file.
    pub fn with_engine(mut self, engine: &EngineConfig) -> Self {
        self.format = engine.format;
        self.chunk_duration_ms = engine.chunk_duration_ms;
        self.drain_timeout = Duration::from_secs(engine.drain_timeout_secs);
        self.fail_fast = engine.fail_fast;
        self.queue = engine.queue.clone();
        self
    }

    /// The queue policy in effect for `target`.
    pub fn queue_for(&self, target: &TargetLang) -> QueueConfig {
        target.queue.clone().unwrap_or_else(|| self.queue.clone())
    }

    /// Bytes of PCM per media frame.
    pub fn chunk_bytes(&self) -> usize {
        (self.format.bytes_per_ms() * self.chunk_duration_ms as u64) as usize
    }

    /// Check the configuration before anything connects.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.lang.clone()) {
                return Err(ConfigError::DuplicateTarget(target.lang.clone()));
            }
        }

        if !(10..=40).contains(&self.chunk_duration_ms) {
            return Err(ConfigError::ChunkDurationOutOfRange(self.chunk_duration_ms));
        }

        if self.format.sample_rate == 0 || self.format.channels == 0 {
            return Err(ConfigError::InvalidValue {
                key: "format".to_string(),
                message: format!(
                    "{} Hz / {} channels",
                    self.format.sample_rate, self.format.channels
                ),
            });
        }

        for target in &self.targets {
            let queue = self.queue_for(target);
            if queue.max_queue_level_ms == 0 || queue.desired_queue_level_ms > queue.max_queue_level_ms
            {
                return Err(ConfigError::QueueThresholds {
                    lang: target.lang.clone(),
                    desired: queue.desired_queue_level_ms,
                    max: queue.max_queue_level_ms,
                });
            }
            if !(0.0..=1.0).contains(&queue.slowdown_tempo) || queue.slowdown_tempo == 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("queue.{}.slowdown_tempo", target.lang),
                    message: queue.slowdown_tempo.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Build the pipeline configuration document sent in `set_task`.
    ///
    /// The service expects transcription keyed by `source_language` and one
    /// translation block per `target_language`, with queue configs under a
    /// `global` key plus per-language overrides.
    pub fn to_pipeline_json(&self) -> Value {
        let mut transcription =
            serde_json::to_value(&self.source.transcription).unwrap_or_else(|_| json!({}));
        if let Some(obj) = transcription.as_object_mut() {
            obj.insert(
                "source_language".to_string(),
                Value::String(self.source.lang.as_str().to_string()),
            );
        }

        let translations: Vec<Value> = self
            .targets
            .iter()
            .map(|target| {
                let mut block =
                    serde_json::to_value(&target.translation).unwrap_or_else(|_| json!({}));
                if let Some(obj) = block.as_object_mut() {
                    obj.insert(
                        "target_language".to_string(),
                        Value::String(target.lang.as_str().to_string()),
                    );
                }
                block
            })
            .collect();

        let mut queue_configs = serde_json::Map::new();
        queue_configs.insert(
            "global".to_string(),
            serde_json::to_value(&self.queue).unwrap_or_else(|_| json!({})),
        );
        for target in &self.targets {
            if let Some(queue) = &target.queue {
                queue_configs.insert(
                    target.lang.as_str().to_string(),
                    serde_json::to_value(queue).unwrap_or_else(|_| json!({})),
                );
            }
        }

        json!({
            "input_stream": {
                "content_type": "audio",
                "source": {
                    "type": "ws",
                    "format": "pcm_s16le",
                    "sample_rate": self.format.sample_rate,
                    "channels": self.format.channels,
                },
            },
            "output_stream": {
                "content_type": "audio",
                "target": { "type": "ws", "format": "pcm_s16le" },
            },
            "pipeline": {
                "preprocessing": self.preprocessing,
                "transcription": transcription,
                "translations": translations,
                "translation_queue_configs": Value::Object(queue_configs),
                "allowed_message_types": ALLOWED_MESSAGE_TYPES,
            },
        })
    }
}

/// Engine settings loadable from a configuration file (TOML/JSON/YAML via
/// the `config` crate). Adapters and callbacks are runtime objects and are
/// supplied in code.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub transport: TransportConfig,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u32,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_chunk_duration_ms() -> u32 {
    20
}

fn default_drain_timeout_secs() -> u64 {
    30
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }
}
