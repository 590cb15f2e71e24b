//! Pipe adapter: serve PCM16 from any async byte stream (stdin, a child
//! process, a socket).

use super::Reader;
use crate::error::ReaderError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Wraps an `AsyncRead` as a session [`Reader`].
pub struct PipeReader<R> {
    inner: R,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> PipeReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, eof: false }
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send + Sync> Reader for PipeReader<R> {
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ReaderError> {
        if self.eof {
            return Ok(None);
        }
        let mut buf = vec![0u8; max_bytes];
        let n = self.inner.read(&mut buf).await?;
        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_until_stream_end() {
        let data: &[u8] = &[1, 2, 3, 4];
        let mut reader = PipeReader::new(data);
        assert_eq!(reader.read(3).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(reader.read(3).await.unwrap(), Some(vec![4]));
        assert_eq!(reader.read(3).await.unwrap(), None);
        assert_eq!(reader.read(3).await.unwrap(), None);
    }
}
