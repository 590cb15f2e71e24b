//! Stream a file and print transcriptions only — no audio writer needed.
//! Source-side partials arrive on the source callback, translated text on
//! the target callback.

use anyhow::{Context, Result};
use lingostream::{
    FileReader, Session, SessionConfig, SourceLang, TargetLang, TranscriptionCallback,
    TransportConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "speech/en.mp3".to_string());
    let url = std::env::var("LINGOSTREAM_WS_URL").context("LINGOSTREAM_WS_URL is not set")?;
    let token = std::env::var("LINGOSTREAM_TOKEN").context("LINGOSTREAM_TOKEN is not set")?;

    let reader = FileReader::open(&input, 16000)?;

    let source = SourceLang::new("en", reader).with_callback(TranscriptionCallback::blocking(
        |event| {
            println!("[en {}] {}", event.kind.as_str(), event.text);
        },
    ));

    // An async callback works too; it is scheduled without blocking routing.
    let target = TargetLang::new("es").with_callback(TranscriptionCallback::scheduled(
        |event: lingostream::TranscriptionEvent| async move {
            println!("[es {}] {}", event.kind.as_str(), event.text);
        },
    ));

    let config = SessionConfig::new(
        TransportConfig::WebSocket { url, token },
        source,
        vec![target],
    );

    let mut session = Session::new(config);
    let outcome = session.run().await?;
    println!(
        "done: {} transcription events, {} duplicates dropped",
        outcome.stats.events_dispatched, outcome.stats.duplicate_events
    );
    Ok(())
}
