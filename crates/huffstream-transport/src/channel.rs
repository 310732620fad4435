//! Secure channel abstraction.
//!
//! Sessions only ever see a [`SecureChannel`]: an ordered, reliable byte
//! stream that is already established (and, if the deployment uses TLS,
//! already authenticated). Certificates and handshakes live in whatever
//! produces the underlying stream.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the channel
    #[error("Channel is closed")]
    Closed,

    /// Operation exceeded its deadline
    #[error("Channel operation timed out")]
    TimedOut,

    /// Listener could not be bound
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    /// Outbound connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl ChannelError {
    /// Returns true if retrying the operation may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
            ChannelError::TimedOut | ChannelError::ConnectionFailed(_) => true,
            ChannelError::Closed | ChannelError::BindFailed(_) => false,
        }
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// An established, ordered, reliable byte stream.
///
/// `read` may return fewer bytes than requested; callers accumulate.
#[async_trait]
pub trait SecureChannel: Send {
    /// Read up to `buf.len()` bytes
    ///
    /// Returns 0 on orderly close by the peer.
    ///
    /// # Errors
    /// Returns `ChannelError` if the underlying stream fails
    async fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize>;

    /// Write the whole buffer
    ///
    /// # Errors
    /// Returns `ChannelError` if the underlying stream fails
    async fn write_all(&mut self, buf: &[u8]) -> ChannelResult<()>;

    /// Flush and close the write half
    ///
    /// # Errors
    /// Returns `ChannelError` if the underlying stream fails
    async fn shutdown(&mut self) -> ChannelResult<()>;

    /// Remote address, if the stream has one
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Byte counters (optional)
    fn stats(&self) -> ChannelStats {
        ChannelStats::default()
    }
}

/// Owned, type-erased channel
pub type BoxedChannel = Box<dyn SecureChannel>;

#[async_trait]
impl<T: SecureChannel + ?Sized> SecureChannel for Box<T> {
    async fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        (**self).read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> ChannelResult<()> {
        (**self).write_all(buf).await
    }

    async fn shutdown(&mut self) -> ChannelResult<()> {
        (**self).shutdown().await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn stats(&self) -> ChannelStats {
        (**self).stats()
    }
}

/// Channel statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Successful read calls returning data
    pub reads: u64,
    /// Successful write calls
    pub writes: u64,
}

impl ChannelStats {
    /// Record a read returning `bytes`
    pub fn record_read(&mut self, bytes: usize) {
        if bytes > 0 {
            self.bytes_read += bytes as u64;
            self.reads += 1;
        }
    }

    /// Record a completed write of `bytes`
    pub fn record_write(&mut self, bytes: usize) {
        self.bytes_written += bytes as u64;
        self.writes += 1;
    }
}

/// [`SecureChannel`] over any tokio stream
///
/// Plain TCP, a TLS stream supplied by an outer layer, or an in-memory
/// duplex pipe all fit.
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
    peer: Option<SocketAddr>,
    stats: ChannelStats,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `stream`
    pub fn new(stream: S, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            stats: ChannelStats::default(),
        }
    }

    /// Recover the wrapped stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> SecureChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        let n = self.stream.read(buf).await?;
        self.stats.record_read(n);
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> ChannelResult<()> {
        match self.stream.write_all(buf).await {
            Ok(()) => {
                self.stats.record_write(buf.len());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Err(ChannelError::Closed),
            Err(err) => Err(err.into()),
        }
    }

    async fn shutdown(&mut self) -> ChannelResult<()> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn stats(&self) -> ChannelStats {
        self.stats
    }
}

/// Two connected in-memory channels
///
/// `capacity` bounds the bytes buffered in each direction.
#[must_use]
pub fn memory_pair(
    capacity: usize,
) -> (StreamChannel<DuplexStream>, StreamChannel<DuplexStream>) {
    let (a, b) = tokio::io::duplex(capacity);
    (StreamChannel::new(a, None), StreamChannel::new(b, None))
}
