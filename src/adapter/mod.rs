//! Pluggable audio adapters.
//!
//! The engine consumes audio through the [`Reader`] contract and produces
//! translated audio through the [`Writer`] contract. Concrete adapters
//! (file, in-memory buffer, pipe) live here; callers are free to bring
//! their own implementations.

pub mod buffer;
pub mod file;
pub mod pipe;

pub use buffer::{shared_buffer, BufferReader, BufferWriter, SharedBuffer};
pub use file::{FileReader, FileWriter};
pub use pipe::PipeReader;

use crate::error::{ReaderError, WriteError};

/// A source of raw PCM16 audio.
///
/// `read` may block/suspend for as long as it needs — it is the input
/// pump's designed suspension point. Returning `Ok(None)` signals
/// end-of-stream and must be sticky: further calls keep returning `None`.
#[async_trait::async_trait]
pub trait Reader: Send + Sync {
    /// Read up to `max_bytes` of PCM16 data.
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ReaderError>;
}

/// A sink for raw PCM16 audio.
#[async_trait::async_trait]
pub trait Writer: Send + Sync {
    /// Write one frame of PCM16 data.
    async fn write(&mut self, pcm: &[u8]) -> Result<(), WriteError>;

    /// Flush and release resources. Idempotent; called once on drain/stop.
    async fn close(&mut self) -> Result<(), WriteError>;
}
