//! Wire messages exchanged with the translation service.
//!
//! Everything on the control channel is a JSON envelope:
//! `{"message_type": "...", "data": {...}}`. Audio rides inside
//! `input_audio_data` / `output_audio_data` envelopes as base64-encoded
//! PCM16, the framing the service expects on message-oriented transports.

use crate::lang::LanguageCode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Fixed per-session PCM format: PCM16LE at this rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes of PCM16 per millisecond of audio.
    pub fn bytes_per_ms(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * 2 / 1000
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Where a frame originated: the local input stream, or one of the
/// translated output streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Input,
    Target(LanguageCode),
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::Input => f.write_str("input"),
            SourceTag::Target(lang) => write!(f, "{lang}"),
        }
    }
}

/// A fixed-format chunk of PCM16 samples.
///
/// Sequence numbers are strictly increasing per source tag; a gap means
/// frames were dropped, never reordered.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw PCM16LE bytes, interleaved.
    pub pcm: Vec<u8>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Sequence number for ordering and gap detection
    pub sequence: u64,
    /// Which stream this frame belongs to
    pub source: SourceTag,
}

impl AudioFrame {
    /// Duration of this frame at its own playback rate.
    pub fn duration_ms(&self) -> u64 {
        let bytes_per_second = self.sample_rate as u64 * self.channels as u64 * 2;
        if bytes_per_second == 0 {
            return 0;
        }
        self.pcm.len() as u64 * 1000 / bytes_per_second
    }
}

/// The kind of transcription-related event received from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionKind {
    /// Interim source-language transcription
    PartialTranscription,
    /// Interim translated transcription for a target
    PartialTranslatedTranscription,
    /// Source transcription confirmed by the verification stage
    ValidatedTranscription,
    /// Final translated transcription for a target
    TranslatedTranscription,
    /// Per-stage latency report for one transcription
    PipelineTimings,
}

impl TranscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionKind::PartialTranscription => "partial_transcription",
            TranscriptionKind::PartialTranslatedTranscription => {
                "partial_translated_transcription"
            }
            TranscriptionKind::ValidatedTranscription => "validated_transcription",
            TranscriptionKind::TranslatedTranscription => "translated_transcription",
            TranscriptionKind::PipelineTimings => "pipeline_timings",
        }
    }
}

/// One timed span of transcribed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Start offset in seconds from stream start
    #[serde(default)]
    pub start: f64,
    /// End offset in seconds from stream start
    #[serde(default)]
    pub end: f64,
}

/// A timestamped transcription event, immutable once received.
///
/// `language` is the target tag for translated kinds and the source
/// language for source-side kinds; `pipeline_timings` may omit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionEvent {
    pub kind: TranscriptionKind,
    #[serde(default)]
    pub transcription_id: String,
    pub language: Option<LanguageCode>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub timings: Option<HashMap<String, f64>>,
}

impl TranscriptionEvent {
    /// Key used to drop duplicates delivered over redundant channels.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            self.transcription_id,
            self.text
        )
    }

    /// True for events attributed to the source stream rather than a target.
    pub fn is_source_side(&self) -> bool {
        matches!(
            self.kind,
            TranscriptionKind::PartialTranscription | TranscriptionKind::ValidatedTranscription
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    message_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct AudioData {
    /// Base64-encoded PCM16
    data: String,
    #[serde(default)]
    sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_language: Option<LanguageCode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TempoData {
    target_language: LanguageCode,
    tempo: f64,
}

/// Per-language buffered-audio report from the remote synthesis queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub language: LanguageCode,
    pub current_queue_level_ms: u32,
    pub max_queue_level_ms: u32,
}

/// Messages the engine sends to the service.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// One chunk of source PCM16 audio
    InputAudioData { sequence: u64, pcm: Vec<u8> },
    /// Full pipeline configuration document
    SetTask(Value),
    /// Request the currently active pipeline configuration
    GetTask,
    /// Source input is complete; begin remote drain
    EndTask,
    /// Tempo-adjustment directive for one target's synthesis stage
    SetSpeechTempo { target_language: LanguageCode, tempo: f64 },
}

impl ClientMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::InputAudioData { .. } => "input_audio_data",
            ClientMessage::SetTask(_) => "set_task",
            ClientMessage::GetTask => "get_task",
            ClientMessage::EndTask => "end_task",
            ClientMessage::SetSpeechTempo { .. } => "set_speech_tempo",
        }
    }

    /// Serialize to the JSON envelope the service expects.
    pub fn to_json(&self) -> String {
        let data = match self {
            ClientMessage::InputAudioData { sequence, pcm } => serde_json::to_value(AudioData {
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
                sequence: *sequence,
                target_language: None,
            })
            .unwrap_or(Value::Null),
            ClientMessage::SetTask(doc) => doc.clone(),
            ClientMessage::GetTask | ClientMessage::EndTask => Value::Object(Default::default()),
            ClientMessage::SetSpeechTempo {
                target_language,
                tempo,
            } => serde_json::to_value(TempoData {
                target_language: target_language.clone(),
                tempo: *tempo,
            })
            .unwrap_or(Value::Null),
        };

        let envelope = Envelope {
            message_type: self.message_type().to_string(),
            data,
        };
        serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Messages the engine receives from the service.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// One chunk of translated PCM16 audio for a target
    OutputAudioData {
        target_language: Option<LanguageCode>,
        sequence: u64,
        pcm: Vec<u8>,
    },
    /// A transcription-related event
    Transcription(TranscriptionEvent),
    /// Buffered-audio report from the remote synthesis queue
    QueueStatus(QueueStatus),
    /// Currently active pipeline configuration
    CurrentTask(Value),
    /// Remote-side drain marker: no further output will arrive
    StreamComplete,
    /// Recognized envelope, unrecognized type; logged and dropped upstream
    Unknown { message_type: String },
}

/// Why an inbound payload could not be turned into a `ServerMessage`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("malformed {message_type} payload: {message}")]
    Payload {
        message_type: String,
        message: String,
    },
}

impl ServerMessage {
    /// Decode one inbound control-channel payload.
    pub fn decode(raw: &str) -> Result<ServerMessage, DecodeError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| DecodeError::Envelope(e.to_string()))?;
        let payload_err = |e: serde_json::Error| DecodeError::Payload {
            message_type: envelope.message_type.clone(),
            message: e.to_string(),
        };

        match envelope.message_type.as_str() {
            "output_audio_data" => {
                let audio: AudioData =
                    serde_json::from_value(envelope.data).map_err(payload_err)?;
                let pcm = base64::engine::general_purpose::STANDARD
                    .decode(audio.data.as_bytes())
                    .map_err(|e| DecodeError::Payload {
                        message_type: "output_audio_data".to_string(),
                        message: e.to_string(),
                    })?;
                Ok(ServerMessage::OutputAudioData {
                    target_language: audio.target_language,
                    sequence: audio.sequence,
                    pcm,
                })
            }
            "partial_transcription"
            | "partial_translated_transcription"
            | "validated_transcription"
            | "translated_transcription" => {
                let kind: TranscriptionKind =
                    serde_json::from_value(Value::String(envelope.message_type.clone()))
                        .map_err(payload_err)?;
                #[derive(Deserialize)]
                struct TranscriptionData {
                    #[serde(default)]
                    transcription_id: String,
                    language: Option<LanguageCode>,
                    #[serde(default)]
                    text: String,
                    #[serde(default)]
                    segments: Vec<Segment>,
                    #[serde(default)]
                    confidence: Option<f32>,
                }
                let data: TranscriptionData =
                    serde_json::from_value(envelope.data).map_err(payload_err)?;
                Ok(ServerMessage::Transcription(TranscriptionEvent {
                    kind,
                    transcription_id: data.transcription_id,
                    language: data.language,
                    text: data.text,
                    segments: data.segments,
                    confidence: data.confidence,
                    timings: None,
                }))
            }
            "pipeline_timings" => {
                #[derive(Deserialize)]
                struct TimingsData {
                    #[serde(default)]
                    transcription_id: String,
                    language: Option<LanguageCode>,
                    #[serde(default)]
                    timings: HashMap<String, f64>,
                }
                let data: TimingsData =
                    serde_json::from_value(envelope.data).map_err(payload_err)?;
                Ok(ServerMessage::Transcription(TranscriptionEvent {
                    kind: TranscriptionKind::PipelineTimings,
                    transcription_id: data.transcription_id,
                    language: data.language,
                    text: String::new(),
                    segments: Vec::new(),
                    confidence: None,
                    timings: Some(data.timings),
                }))
            }
            "queue_status" => {
                // data is keyed by language: {"es": {"current_queue_level_ms": ...}}
                #[derive(Deserialize)]
                struct Levels {
                    current_queue_level_ms: u32,
                    max_queue_level_ms: u32,
                }
                let map: HashMap<String, Levels> =
                    serde_json::from_value(envelope.data).map_err(payload_err)?;
                let (lang, levels) = map.into_iter().next().ok_or(DecodeError::Payload {
                    message_type: "queue_status".to_string(),
                    message: "empty language map".to_string(),
                })?;
                let language =
                    LanguageCode::new(&lang).ok_or_else(|| DecodeError::Payload {
                        message_type: "queue_status".to_string(),
                        message: format!("bad language key {lang:?}"),
                    })?;
                Ok(ServerMessage::QueueStatus(QueueStatus {
                    language,
                    current_queue_level_ms: levels.current_queue_level_ms,
                    max_queue_level_ms: levels.max_queue_level_ms,
                }))
            }
            "current_task" => Ok(ServerMessage::CurrentTask(envelope.data)),
            "stream_complete" => Ok(ServerMessage::StreamComplete),
            other => Ok(ServerMessage::Unknown {
                message_type: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_audio_round_trip() {
        let msg = ClientMessage::InputAudioData {
            sequence: 7,
            pcm: vec![1, 2, 3, 4],
        };
        let json = msg.to_json();
        assert!(json.contains("\"message_type\":\"input_audio_data\""));
        assert!(json.contains("\"sequence\":7"));

        let value: Value = serde_json::from_str(&json).unwrap();
        let b64 = value["data"]["data"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 4]);
    }

    #[test]
    fn decodes_output_audio() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 1, 2, 3]);
        let raw = format!(
            r#"{{"message_type":"output_audio_data","data":{{"data":"{b64}","sequence":3,"target_language":"es"}}}}"#
        );
        match ServerMessage::decode(&raw).unwrap() {
            ServerMessage::OutputAudioData {
                target_language,
                sequence,
                pcm,
            } => {
                assert_eq!(target_language, Some(LanguageCode::es()));
                assert_eq!(sequence, 3);
                assert_eq!(pcm, vec![0, 1, 2, 3]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decodes_translated_transcription() {
        let raw = r#"{
            "message_type": "translated_transcription",
            "data": {
                "transcription_id": "t-1",
                "language": "fr",
                "text": "bonjour",
                "segments": [{"text": "bonjour", "start": 0.0, "end": 0.8}],
                "confidence": 0.92
            }
        }"#;
        match ServerMessage::decode(raw).unwrap() {
            ServerMessage::Transcription(event) => {
                assert_eq!(event.kind, TranscriptionKind::TranslatedTranscription);
                assert_eq!(event.language, Some(LanguageCode::fr()));
                assert_eq!(event.text, "bonjour");
                assert_eq!(event.segments.len(), 1);
                assert!(!event.is_source_side());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decodes_queue_status() {
        let raw = r#"{
            "message_type": "queue_status",
            "data": {"es": {"current_queue_level_ms": 4200, "max_queue_level_ms": 24000}}
        }"#;
        match ServerMessage::decode(raw).unwrap() {
            ServerMessage::QueueStatus(status) => {
                assert_eq!(status.language, LanguageCode::es());
                assert_eq!(status.current_queue_level_ms, 4200);
                assert_eq!(status.max_queue_level_ms, 24000);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let raw = r#"{"message_type": "shiny_new_thing", "data": {}}"#;
        match ServerMessage::decode(raw).unwrap() {
            ServerMessage::Unknown { message_type } => {
                assert_eq!(message_type, "shiny_new_thing");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerMessage::decode("not json").is_err());
    }

    #[test]
    fn source_side_attribution() {
        let event = TranscriptionEvent {
            kind: TranscriptionKind::PartialTranscription,
            transcription_id: "t-2".to_string(),
            language: Some(LanguageCode::en()),
            text: "hello".to_string(),
            segments: vec![],
            confidence: None,
            timings: None,
        };
        assert!(event.is_source_side());
        assert!(event.dedup_key().contains("t-2"));
        assert!(event.dedup_key().contains("hello"));
    }

    #[test]
    fn frame_duration() {
        let frame = AudioFrame {
            pcm: vec![0; 16000 * 2 / 50], // 20 ms of 16 kHz mono PCM16
            sample_rate: 16000,
            channels: 1,
            sequence: 0,
            source: SourceTag::Input,
        };
        assert_eq!(frame.duration_ms(), 20);
    }
}
