//! Configuration validation and pipeline-document tests.

use lingostream::{
    BufferReader, ConfigError, EngineConfig, QueueConfig, SessionConfig, SourceLang, TargetLang,
    TransportConfig,
};

fn transport() -> TransportConfig {
    TransportConfig::WebSocket {
        url: "wss://api.example.com/ws".into(),
        token: "jwt".into(),
    }
}

fn source() -> SourceLang {
    SourceLang::new("en", BufferReader::new(Vec::new()))
}

#[test]
fn at_least_one_target_required() {
    let config = SessionConfig::new(transport(), source(), Vec::new());
    assert!(matches!(config.validate(), Err(ConfigError::NoTargets)));
}

#[test]
fn duplicate_targets_rejected() {
    let config = SessionConfig::new(
        transport(),
        source(),
        vec![TargetLang::new("es"), TargetLang::new("es")],
    );
    assert!(matches!(
        config.validate(),
        Err(ConfigError::DuplicateTarget(lang)) if lang.as_str() == "es"
    ));
}

#[test]
fn chunk_duration_bounds_enforced() {
    let mut config = SessionConfig::new(transport(), source(), vec![TargetLang::new("es")]);
    config.chunk_duration_ms = 5;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ChunkDurationOutOfRange(5))
    ));

    config.chunk_duration_ms = 40;
    assert!(config.validate().is_ok());
}

#[test]
fn queue_thresholds_must_be_sane() {
    let target = TargetLang::new("es").with_queue(QueueConfig {
        desired_queue_level_ms: 30000,
        max_queue_level_ms: 10000,
        auto_tempo: true,
        slowdown_tempo: 0.8,
    });
    let config = SessionConfig::new(transport(), source(), vec![target]);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::QueueThresholds { desired: 30000, max: 10000, .. })
    ));
}

#[test]
fn default_config_validates() {
    let config = SessionConfig::new(
        transport(),
        source(),
        vec![TargetLang::new("es"), TargetLang::new("fr")],
    );
    assert!(config.validate().is_ok());
    assert_eq!(config.chunk_bytes(), 640); // 20 ms at 16 kHz mono PCM16
}

#[test]
fn pipeline_document_shape() {
    let es = TargetLang::new("es").with_queue(QueueConfig {
        desired_queue_level_ms: 4000,
        max_queue_level_ms: 16000,
        auto_tempo: true,
        slowdown_tempo: 0.8,
    });
    let fr = TargetLang::new("fr");
    let config = SessionConfig::new(transport(), source(), vec![es, fr]);

    let doc = config.to_pipeline_json();

    assert_eq!(doc["input_stream"]["content_type"], "audio");
    assert_eq!(doc["input_stream"]["source"]["sample_rate"], 16000);
    assert_eq!(doc["input_stream"]["source"]["channels"], 1);

    let pipeline = &doc["pipeline"];
    assert_eq!(pipeline["transcription"]["source_language"], "en");
    assert_eq!(pipeline["transcription"]["asr_model"], "auto");

    let translations = pipeline["translations"].as_array().unwrap();
    assert_eq!(translations.len(), 2);
    assert_eq!(translations[0]["target_language"], "es");
    assert_eq!(translations[1]["target_language"], "fr");
    assert!(translations[0]["speech_generation"]["tts_model"].is_string());

    let queues = &pipeline["translation_queue_configs"];
    assert_eq!(queues["global"]["desired_queue_level_ms"], 8000);
    assert_eq!(queues["es"]["desired_queue_level_ms"], 4000);
    assert_eq!(queues["es"]["auto_tempo"], true);
    // Only overridden targets appear alongside the global entry.
    assert!(queues.get("fr").is_none());
    // The client-side tempo value never leaks onto the wire.
    assert!(queues["es"].get("slowdown_tempo").is_none());

    let allowed = pipeline["allowed_message_types"].as_array().unwrap();
    assert_eq!(allowed.len(), 5);
    assert!(allowed.iter().any(|v| v == "translated_transcription"));
    assert!(allowed.iter().any(|v| v == "pipeline_timings"));
}

#[test]
fn engine_config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
chunk_duration_ms = 40
drain_timeout_secs = 5
fail_fast = true

[transport]
kind = "nats"
url = "nats://localhost:4222"
subject_prefix = "translate.session-1"

[format]
sample_rate = 24000
channels = 1

[queue]
desired_queue_level_ms = 4000
max_queue_level_ms = 12000
auto_tempo = true
"#,
    )
    .unwrap();

    let name = dir.path().join("engine");
    let engine = EngineConfig::load(name.to_str().unwrap()).unwrap();

    assert!(matches!(
        engine.transport,
        TransportConfig::Nats { ref url, ref subject_prefix }
            if url == "nats://localhost:4222" && subject_prefix == "translate.session-1"
    ));
    assert_eq!(engine.format.sample_rate, 24000);
    assert_eq!(engine.chunk_duration_ms, 40);
    assert_eq!(engine.drain_timeout_secs, 5);
    assert!(engine.fail_fast);
    assert!(engine.queue.auto_tempo);
    assert_eq!(engine.queue.slowdown_tempo, 0.8); // default preserved

    let config = SessionConfig::new(transport(), source(), vec![TargetLang::new("es")])
        .with_engine(&engine);
    assert_eq!(config.format.sample_rate, 24000);
    assert_eq!(config.drain_timeout.as_secs(), 5);
    assert!(config.fail_fast);
    assert_eq!(config.chunk_bytes(), 1920); // 40 ms at 24 kHz mono
}
