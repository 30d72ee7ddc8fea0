//! Transport seam — the byte-stream interface the session consumes, plus
//! the production TCP implementation.
//!
//! The read half is owned exclusively by the receive loop; the write half
//! is shared behind a mutex by every send-side caller. Closing is
//! dropping both halves.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Twitch's plaintext IRC endpoint.
pub const TWITCH_IRC_ADDR: &str = "irc.chat.twitch.tv:6667";

const READ_CHUNK_CAPACITY: usize = 4096;

/// Transport-level failures. Never retried; a failed session is discarded.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("transport write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Inbound half of a byte stream.
#[async_trait]
pub trait TransportReader: Send {
    /// Next chunk of bytes, in arbitrary sizes with no line alignment.
    /// `Ok(None)` is end of stream. Suspends until data arrives; the
    /// caller cancels a pending read by dropping the future.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Outbound half of a byte stream.
#[async_trait]
pub trait TransportWriter: Send {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;
}

/// Opens a fresh bidirectional byte stream for one session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
    ) -> Result<(Box<dyn TransportReader>, Box<dyn TransportWriter>), TransportError>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Connector for the production Twitch endpoint.
    pub fn twitch() -> Self {
        Self::new(TWITCH_IRC_ADDR)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(
        &self,
    ) -> Result<(Box<dyn TransportReader>, Box<dyn TransportWriter>), TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();
        Ok((
            Box::new(TcpReader { half: read_half }),
            Box::new(TcpWriter { half: write_half }),
        ))
    }
}

struct TcpReader {
    half: OwnedReadHalf,
}

#[async_trait]
impl TransportReader for TcpReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_CAPACITY);
        let n = self
            .half
            .read_buf(&mut buf)
            .await
            .map_err(TransportError::Read)?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(buf.freeze()))
        }
    }
}

struct TcpWriter {
    half: OwnedWriteHalf,
}

#[async_trait]
impl TransportWriter for TcpWriter {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        AsyncWriteExt::write_all(&mut self.half, buf)
            .await
            .map_err(TransportError::Write)
    }
}
