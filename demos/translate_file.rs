//! Translate an audio file end to end: speech in one language goes up to
//! the service, translated speech comes back and lands in a WAV.
//!
//! Usage: translate_file <input-audio> <output.wav>
//! The service endpoint comes from LINGOSTREAM_WS_URL / LINGOSTREAM_TOKEN.

use anyhow::{Context, Result};
use lingostream::{
    FileReader, FileWriter, Session, SessionConfig, SourceLang, TargetLang, TransportConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "speech/es.mp3".to_string());
    let output = args.next().unwrap_or_else(|| "es2en_out.wav".to_string());

    let url = std::env::var("LINGOSTREAM_WS_URL").context("LINGOSTREAM_WS_URL is not set")?;
    let token = std::env::var("LINGOSTREAM_TOKEN").context("LINGOSTREAM_TOKEN is not set")?;

    let reader = FileReader::open(&input, 16000)?;
    let writer = FileWriter::create(&output, 16000, 1)?;

    let config = SessionConfig::new(
        TransportConfig::WebSocket { url, token },
        SourceLang::new("es", reader),
        vec![TargetLang::new("en").with_writer(writer)],
    );

    let mut session = Session::new(config);
    let outcome = session.run().await?;

    info!(
        "Session finished in state {:?}: {} frames sent, {} frames received, {} bytes written",
        outcome.state,
        outcome.stats.frames_sent,
        outcome.stats.frames_routed,
        outcome.stats.bytes_written,
    );
    if let Some(error) = outcome.error {
        anyhow::bail!("translation failed: {error}");
    }
    Ok(())
}
