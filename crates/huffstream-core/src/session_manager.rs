//! Server: accept loops and bounded session admission.
//!
//! Two listeners run side by side. The control accept loop is the only
//! place sessions are admitted: it tries to take a semaphore permit without
//! waiting, refuses with `busy` when none is left, and otherwise hands the
//! channel to a new session task. The data accept loop hands every data
//! connection to a short binding task that reads the session id and routes
//! the channel to the waiting session.
//!
//! Neither loop ever awaits a peer; all per-peer I/O happens in spawned
//! tasks.

use crate::config::{ServerEndpoint, SessionConfig};
use crate::control::{self, ControlResponse};
use crate::error::Result;
use crate::protocol::FramedChannel;
use crate::session::{Session, SessionContext, SessionId};
use crate::sink::TransferSink;
use huffstream_transport::{Acceptor, BoxedChannel, TcpAcceptor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Longest session id line accepted on a data channel
const SESSION_LINE_MAX: usize = 64;

/// Configured, not yet listening server
pub struct SessionManager {
    config: SessionConfig,
    sink: Arc<dyn TransferSink>,
}

impl SessionManager {
    /// Create a server delivering transfers to `sink`
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation
    pub fn new(config: SessionConfig, sink: Arc<dyn TransferSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    /// Bind both TCP listeners of `endpoint` and start serving
    ///
    /// # Errors
    /// Returns `Channel` if either listener cannot be bound
    pub async fn bind(self, endpoint: &ServerEndpoint) -> Result<RunningServer> {
        let control = TcpAcceptor::bind_host(&endpoint.host, endpoint.control_port).await?;
        let data = TcpAcceptor::bind_host(&endpoint.host, endpoint.data_port).await?;
        self.serve(control, data)
    }

    /// Start serving on already-bound acceptors
    ///
    /// # Errors
    /// Returns `Channel` if an acceptor cannot report its address
    pub fn serve<A, B>(self, control: A, data: B) -> Result<RunningServer>
    where
        A: Acceptor + 'static,
        B: Acceptor + 'static,
    {
        let control_addr = control.local_addr()?;
        let data_addr = data.local_addr()?;
        let limit = self.config.max_sessions;
        let permits = Arc::new(Semaphore::new(limit));
        let context = Arc::new(SessionContext::new(self.config, self.sink));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let control_loop = tokio::spawn(control_accept_loop(
            control,
            Arc::clone(&context),
            Arc::clone(&permits),
            shutdown_rx.clone(),
        ));
        let data_loop = tokio::spawn(data_accept_loop(data, Arc::clone(&context), shutdown_rx));

        tracing::info!(%control_addr, %data_addr, max_sessions = limit, "server listening");

        Ok(RunningServer {
            control_addr,
            data_addr,
            limit,
            permits,
            shutdown: shutdown_tx,
            accept_loops: vec![control_loop, data_loop],
        })
    }
}

/// Handle to a listening server
///
/// Dropping the handle also stops the server, but only
/// [`RunningServer::shutdown`] waits for the listeners to close.
pub struct RunningServer {
    control_addr: SocketAddr,
    data_addr: SocketAddr,
    limit: usize,
    permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    accept_loops: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Control listener address
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Data listener address
    #[must_use]
    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    /// Endpoint clients can dial, using `host`
    #[must_use]
    pub fn endpoint(&self, host: &str) -> ServerEndpoint {
        ServerEndpoint::new(host, self.data_addr.port(), self.control_addr.port())
    }

    /// Sessions currently holding a permit
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Configured session bound
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.limit
    }

    /// Stop accepting, close both listeners and signal every session
    ///
    /// Returns once both listening sockets are closed, so the addresses can
    /// be bound again immediately.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.accept_loops {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "accept loop ended abnormally");
            }
        }
        tracing::info!(control_addr = %self.control_addr, data_addr = %self.data_addr, "server stopped");
    }
}

async fn control_accept_loop<A: Acceptor>(
    acceptor: A,
    context: Arc<SessionContext>,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let limit = context.config.max_sessions;
    loop {
        let channel = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = acceptor.accept() => match accepted {
                Ok(channel) => channel,
                Err(err) => {
                    tracing::warn!(error = %err, "control accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        match Arc::clone(&permits).try_acquire_owned() {
            Ok(permit) => {
                let session = Session::new(Arc::clone(&context));
                tokio::spawn(session.run(channel, permit, shutdown.clone()));
            }
            Err(_) => {
                tracing::warn!(peer = ?channel.peer_addr(), limit, "session limit reached, refusing");
                tokio::spawn(refuse(channel, limit, context.config.io_timeout));
            }
        }
    }
    tracing::debug!("control accept loop stopped");
}

/// Tell a peer the server is full, then close
async fn refuse(channel: BoxedChannel, limit: usize, timeout: Duration) {
    let mut channel = FramedChannel::new(channel, 64);
    if let Err(err) = send_busy(&mut channel, limit, timeout).await {
        tracing::debug!(error = %err, "failed to deliver busy response");
    }
}

async fn send_busy(
    channel: &mut FramedChannel<BoxedChannel>,
    limit: usize,
    timeout: Duration,
) -> Result<()> {
    let line = control::encode_line(&ControlResponse::Busy { limit })?;
    channel.write_all(&line, timeout).await?;
    channel.shutdown().await
}

async fn data_accept_loop<A: Acceptor>(
    acceptor: A,
    context: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let channel = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = acceptor.accept() => match accepted {
                Ok(channel) => channel,
                Err(err) => {
                    tracing::warn!(error = %err, "data accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        tokio::spawn(bind_data_channel(channel, Arc::clone(&context)));
    }
    tracing::debug!("data accept loop stopped");
}

/// Read the session id line and hand the channel to its session
async fn bind_data_channel(channel: BoxedChannel, context: Arc<SessionContext>) {
    let peer = channel.peer_addr();
    let mut data = FramedChannel::new(channel, context.config.buffer_size);

    let line = match data
        .read_line(SESSION_LINE_MAX, Some(context.config.io_timeout))
        .await
    {
        Ok(Some(line)) => line,
        Ok(None) => {
            tracing::debug!(?peer, "data channel closed before session id");
            return;
        }
        Err(err) => {
            tracing::debug!(?peer, error = %err, "data channel sent no session id");
            return;
        }
    };

    let Some(id) = std::str::from_utf8(&line).ok().and_then(SessionId::parse) else {
        tracing::warn!(?peer, "data channel sent a malformed session id");
        return;
    };

    match context.pending.remove(&id) {
        Some((_, waiting)) => {
            if waiting.send(data).is_err() {
                tracing::debug!(session = %id, "session ended before its data channel arrived");
            }
        }
        None => tracing::warn!(?peer, session = %id, "data channel for unknown session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionClient;
    use crate::error::ErrorKind;
    use crate::sink::MemorySink;
    use huffstream_transport::{SecureChannel, TcpConnector};

    fn test_config(max_sessions: usize) -> SessionConfig {
        SessionConfig {
            max_sessions,
            io_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    async fn start(max_sessions: usize) -> (RunningServer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let server = SessionManager::new(test_config(max_sessions), sink.clone())
            .unwrap()
            .bind(&ServerEndpoint::new("127.0.0.1", 0, 0))
            .await
            .unwrap();
        (server, sink)
    }

    async fn connect(server: &RunningServer) -> Result<SessionClient> {
        SessionClient::connect(
            &server.endpoint("127.0.0.1"),
            test_config(1),
            &TcpConnector::default(),
        )
        .await
    }

    /// Wait until the server reports `expected` active sessions
    async fn wait_for_sessions(server: &RunningServer, expected: usize) {
        for _ in 0..200 {
            if server.active_sessions() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} active sessions, found {}",
            server.active_sessions()
        );
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = SessionManager::new(test_config(0), Arc::new(MemorySink::new()));
        assert_eq!(result.err().unwrap().kind(), ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn test_single_transfer() {
        let (server, sink) = start(4).await;
        let mut client = connect(&server).await.unwrap();

        let report = client.send("notes_encoded.txt", b"hello hello hello").await.unwrap();
        assert_eq!(report.stats.original_size, 17);

        let stored = sink.transfers();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "notes_encoded.txt");
        assert_eq!(stored[0].data, b"hello hello hello");
        assert_eq!(stored[0].transfer_id, report.transfer_id);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_bound_refuses_third() {
        let (server, sink) = start(2).await;

        let mut first = connect(&server).await.unwrap();
        let mut second = connect(&server).await.unwrap();
        wait_for_sessions(&server, 2).await;

        let err = connect(&server).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::SessionLimitExceeded);
        assert!(matches!(err, crate::Error::SessionLimitExceeded { limit: 2 }));

        let (a, b) = tokio::join!(
            first.send("a.txt", b"first payload"),
            second.send("b.txt", b"second payload"),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(sink.len(), 2);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_permit_released_when_session_ends() {
        let (server, _sink) = start(1).await;

        let client = connect(&server).await.unwrap();
        wait_for_sessions(&server, 1).await;
        assert!(connect(&server).await.is_err());

        client.close().await.unwrap();
        wait_for_sessions(&server, 0).await;
        assert!(connect(&server).await.is_ok());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_and_unknown_transfer() {
        let (server, _sink) = start(2).await;
        let mut client = connect(&server).await.unwrap();

        let report = client.send("x.bin", &[1, 2, 3, 4, 5]).await.unwrap();
        assert_eq!(
            client.status(&report.transfer_id).await.unwrap(),
            crate::TransferStatus::Decoded
        );
        assert_eq!(
            client.status("never-prepared").await.unwrap(),
            crate::TransferStatus::Unknown
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_corrupt_container_is_rejected_and_session_survives() {
        let (server, sink) = start(2).await;
        let mut client = connect(&server).await.unwrap();

        let mut blob = huffstream_codec::compress(b"some data worth sending").unwrap();
        // corrupt the stored digest
        blob[9] ^= 0x01;

        let err = client
            .send_container("broken.huff", &blob, |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert!(sink.is_empty());

        client.send("fine.txt", b"still works").await.unwrap();
        assert_eq!(sink.len(), 1);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_dropped() {
        let (server, _sink) = start(2).await;
        let connector = TcpConnector::default();
        let addr = server.data_addr();

        let mut data = huffstream_transport::Connector::connect(
            &connector,
            "127.0.0.1",
            addr.port(),
        )
        .await
        .unwrap();
        data.write_all(b"0000000000000000\n").await.unwrap();

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), data.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_rebind_after_shutdown() {
        let (server, _sink) = start(2).await;
        let endpoint = server.endpoint("127.0.0.1");
        let _client = connect(&server).await.unwrap();

        server.shutdown().await;

        let again = SessionManager::new(test_config(2), Arc::new(MemorySink::new()))
            .unwrap()
            .bind(&endpoint)
            .await
            .unwrap();
        assert_eq!(again.control_addr().port(), endpoint.control_port);
        assert_eq!(again.data_addr().port(), endpoint.data_port);
        again.shutdown().await;
    }
}
