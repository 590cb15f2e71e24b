//! In-memory adapters, useful for embedding and for tests.

use super::{Reader, Writer};
use crate::error::{ReaderError, WriteError};
use std::sync::{Arc, Mutex};

/// A byte buffer shared between a running session and the caller.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Create an empty [`SharedBuffer`].
pub fn shared_buffer() -> SharedBuffer {
    Arc::new(Mutex::new(Vec::new()))
}

/// Serves PCM16 from an in-memory buffer until exhausted.
pub struct BufferReader {
    data: Vec<u8>,
    position: usize,
}

impl BufferReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

#[async_trait::async_trait]
impl Reader for BufferReader {
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ReaderError> {
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let end = (self.position + max_bytes).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}

/// Appends PCM16 into a [`SharedBuffer`] the caller can inspect after the
/// session finishes.
pub struct BufferWriter {
    buffer: SharedBuffer,
    closed: bool,
}

impl BufferWriter {
    pub fn new(buffer: SharedBuffer) -> Self {
        Self {
            buffer,
            closed: false,
        }
    }
}

#[async_trait::async_trait]
impl Writer for BufferWriter {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), WriteError> {
        if self.closed {
            return Err(WriteError::new("writer already closed"));
        }
        self.buffer
            .lock()
            .map_err(|_| WriteError::new("buffer lock poisoned"))?
            .extend_from_slice(pcm);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriteError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_serves_chunks_then_eof() {
        let mut reader = BufferReader::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.read(2).await.unwrap(), Some(vec![1, 2]));
        assert_eq!(reader.read(2).await.unwrap(), Some(vec![3, 4]));
        assert_eq!(reader.read(2).await.unwrap(), Some(vec![5]));
        assert_eq!(reader.read(2).await.unwrap(), None);
        // EOF is sticky
        assert_eq!(reader.read(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn writer_appends_and_rejects_after_close() {
        let buffer = shared_buffer();
        let mut writer = BufferWriter::new(buffer.clone());
        writer.write(&[1, 2]).await.unwrap();
        writer.write(&[3]).await.unwrap();
        writer.close().await.unwrap();
        assert!(writer.write(&[4]).await.is_err());
        assert_eq!(*buffer.lock().unwrap(), vec![1, 2, 3]);
    }
}
