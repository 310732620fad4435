//! TCP listeners and dialers.

use crate::DEFAULT_BACKLOG;
use crate::channel::{BoxedChannel, ChannelError, ChannelResult, StreamChannel};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Source of inbound channels
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// Wait for the next inbound channel
    ///
    /// # Errors
    /// Returns `ChannelError` if accepting fails
    async fn accept(&self) -> ChannelResult<BoxedChannel>;

    /// Address the acceptor listens on
    ///
    /// # Errors
    /// Returns `ChannelError` if the address cannot be determined
    fn local_addr(&self) -> ChannelResult<SocketAddr>;
}

/// Source of outbound channels
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `host:port`
    ///
    /// # Errors
    /// Returns `ChannelError` if the connection cannot be established
    async fn connect(&self, host: &str, port: u16) -> ChannelResult<BoxedChannel>;
}

/// Resolve `host:port` to the first matching socket address
///
/// # Errors
/// Returns `ConnectionFailed` if the name does not resolve.
pub async fn resolve(host: &str, port: u16) -> ChannelResult<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ChannelError::ConnectionFailed(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| ChannelError::ConnectionFailed(format!("{host}:{port}: no addresses")))
}

/// TCP listener bound with `SO_REUSEADDR`
///
/// Dropping the acceptor closes the listening socket; the same address can
/// then be bound again straight away.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind a listener on `addr`. Port 0 selects a free port.
    ///
    /// # Errors
    /// Returns `BindFailed` if the socket cannot be created or bound
    pub fn bind(addr: SocketAddr) -> ChannelResult<Self> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket =
            socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
                .map_err(|e| ChannelError::BindFailed(e.to_string()))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ChannelError::BindFailed(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| ChannelError::BindFailed(format!("{addr}: {e}")))?;
        socket
            .listen(DEFAULT_BACKLOG)
            .map_err(|e| ChannelError::BindFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ChannelError::BindFailed(e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| ChannelError::BindFailed(e.to_string()))?;

        tracing::debug!(%addr, "tcp listener bound");
        Ok(Self { listener })
    }

    /// Resolve `host` and bind on `port`
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if `host` does not resolve, `BindFailed`
    /// if binding fails
    pub async fn bind_host(host: &str, port: u16) -> ChannelResult<Self> {
        Self::bind(resolve(host, port).await?)
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&self) -> ChannelResult<BoxedChannel> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::trace!(%peer, "accepted tcp connection");
        Ok(Box::new(StreamChannel::new(stream, Some(peer))))
    }

    fn local_addr(&self) -> ChannelResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// TCP dialer with a connect deadline
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector that gives up after `connect_timeout`
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> ChannelResult<BoxedChannel> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ChannelError::TimedOut)?
            .map_err(|e| ChannelError::ConnectionFailed(format!("{host}:{port}: {e}")))?;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        tracing::trace!(host, port, "connected");
        Ok(Box::new(StreamChannel::new(stream, peer)))
    }
}
