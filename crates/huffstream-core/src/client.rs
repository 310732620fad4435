//! Client side of a session.

use crate::config::{ServerEndpoint, SessionConfig};
use crate::control::{self, ControlRequest, ControlResponse, TransferStatus};
use crate::error::{Error, Result};
use crate::protocol::{FramedChannel, TransferProtocol};
use huffstream_codec::CompressionStats;
use huffstream_transport::{BoxedChannel, ChannelError, Connector, RetryPolicy, connect_with_retry};
use std::future;
use std::time::{Duration, Instant};

/// Outcome of one acknowledged transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    /// Identifier used on the control channel
    pub transfer_id: String,
    /// Name sent in the transfer header
    pub name: String,
    /// Original and container sizes
    pub stats: CompressionStats,
    /// Time from prepare to acknowledgement
    pub elapsed: Duration,
}

/// An open session with a server
pub struct SessionClient {
    control: FramedChannel<BoxedChannel>,
    data: FramedChannel<BoxedChannel>,
    session_id: String,
    config: SessionConfig,
    protocol: TransferProtocol,
}

impl SessionClient {
    /// Open a session with a single dial per channel
    ///
    /// # Errors
    /// `SessionLimitExceeded` if the server is full, `Channel` if either
    /// channel cannot be opened, `Protocol` for an unexpected greeting
    pub async fn connect(
        endpoint: &ServerEndpoint,
        config: SessionConfig,
        connector: &dyn Connector,
    ) -> Result<Self> {
        Self::connect_with_retry(endpoint, config, connector, RetryPolicy::none()).await
    }

    /// Open a session, retrying each dial per `retry`
    ///
    /// A full server is reported at once, not retried.
    ///
    /// # Errors
    /// See [`SessionClient::connect`]
    pub async fn connect_with_retry(
        endpoint: &ServerEndpoint,
        config: SessionConfig,
        connector: &dyn Connector,
        retry: RetryPolicy,
    ) -> Result<Self> {
        config.validate()?;

        let control =
            connect_with_retry(connector, &endpoint.host, endpoint.control_port, retry).await?;
        let mut control = FramedChannel::new(control, config.buffer_size);

        let session_id = match read_response(&mut control, &config).await? {
            ControlResponse::Welcome { session_id } => session_id,
            ControlResponse::Busy { limit } => {
                tracing::warn!(server = %endpoint, limit, "server is at its session limit");
                return Err(Error::SessionLimitExceeded { limit });
            }
            other => {
                tracing::debug!(?other, "unexpected greeting");
                return Err(Error::protocol("unexpected greeting"));
            }
        };

        let data = connect_with_retry(connector, &endpoint.host, endpoint.data_port, retry).await?;
        let mut data = FramedChannel::new(data, config.buffer_size);
        data.write_all(format!("{session_id}\n").as_bytes(), config.io_timeout)
            .await?;

        tracing::info!(server = %endpoint, session = %session_id, "session opened");
        Ok(Self {
            control,
            data,
            session_id,
            protocol: TransferProtocol::new(&config),
            config,
        })
    }

    /// Identifier the server assigned
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Compress `data` and transfer it as `name`
    ///
    /// # Errors
    /// See [`SessionClient::send_container`]
    pub async fn send(&mut self, name: &str, data: &[u8]) -> Result<TransferReport> {
        self.send_with_progress(name, data, |_| {}).await
    }

    /// [`SessionClient::send`] with a callback receiving cumulative bytes sent
    ///
    /// # Errors
    /// See [`SessionClient::send_container`]
    pub async fn send_with_progress(
        &mut self,
        name: &str,
        data: &[u8],
        progress: impl FnMut(u64) + Send,
    ) -> Result<TransferReport> {
        let container = huffstream_codec::compress(data)?;
        self.send_container(name, &container, progress).await
    }

    /// Transfer an already packed container
    ///
    /// # Errors
    /// `MalformedContainer` if `container` does not parse, `Rejected` if
    /// the server refuses the transfer, `Channel`/`Protocol` on session
    /// failure
    pub async fn send_container(
        &mut self,
        name: &str,
        container: &[u8],
        progress: impl FnMut(u64) + Send,
    ) -> Result<TransferReport> {
        self.transfer(name, container, progress, future::pending())
            .await
    }

    /// [`SessionClient::send_container`] that stops once `cancel` resolves
    ///
    /// A cancel sends `cancel` on the control channel and waits for the
    /// server to confirm it. The server ends the session after a transfer
    /// is cancelled mid-body, so close the client afterwards.
    ///
    /// # Errors
    /// `Cancelled` if `cancel` resolved first; otherwise see
    /// [`SessionClient::send_container`]
    pub async fn send_container_with_cancel(
        &mut self,
        name: &str,
        container: &[u8],
        progress: impl FnMut(u64) + Send,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<TransferReport> {
        self.transfer(name, container, progress, cancel).await
    }

    async fn transfer(
        &mut self,
        name: &str,
        container: &[u8],
        progress: impl FnMut(u64) + Send,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<TransferReport> {
        let original_size = huffstream_codec::unpack(container)?.original_len();
        let stats = CompressionStats {
            original_size,
            container_size: container.len() as u64,
        };

        let started = Instant::now();
        let transfer_id = new_transfer_id();
        self.request(&ControlRequest::Prepare {
            transfer_id: transfer_id.clone(),
            filename: name.to_string(),
            filesize: container.len() as u64,
        })
        .await?;

        match read_response(&mut self.control, &self.config).await? {
            ControlResponse::Ready { transfer_id: ready } if ready == transfer_id => {}
            ControlResponse::Error { message } => return Err(Error::Rejected(message)),
            other => {
                tracing::debug!(?other, "unexpected reply to prepare");
                return Err(Error::protocol("unexpected reply to prepare"));
            }
        }

        tracing::debug!(
            transfer = %transfer_id,
            name,
            size = container.len(),
            "server ready"
        );
        let send = self.protocol.send(&mut self.data, name, container, progress);
        tokio::select! {
            result = send => result?,
            () = cancel => {
                tracing::info!(transfer = %transfer_id, name, "cancelling transfer");
                let line = control::encode_line(&ControlRequest::Cancel {
                    transfer_id: transfer_id.clone(),
                })?;
                self.control.write_all(&line, self.config.io_timeout).await?;
                return match read_response(&mut self.control, &self.config).await? {
                    ControlResponse::Cancelled { .. } => Err(Error::Cancelled { transfer_id }),
                    _ => Err(Error::protocol("unexpected reply to cancel")),
                };
            }
        }

        let report = TransferReport {
            transfer_id,
            name: name.to_string(),
            stats,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            transfer = %report.transfer_id,
            name,
            original = stats.original_size,
            container = stats.container_size,
            "transfer acknowledged"
        );
        Ok(report)
    }

    /// Ask the server for a transfer's state
    ///
    /// # Errors
    /// `Channel`/`Protocol` on session failure
    pub async fn status(&mut self, transfer_id: &str) -> Result<TransferStatus> {
        self.request(&ControlRequest::Status {
            transfer_id: transfer_id.to_string(),
        })
        .await?;

        match read_response(&mut self.control, &self.config).await? {
            ControlResponse::Transfer { state, .. } => Ok(state),
            _ => Err(Error::protocol("unexpected reply to status")),
        }
    }

    /// Cancel a transfer that is not in flight
    ///
    /// This borrows the client, so it cannot run during a send; use
    /// [`SessionClient::send_container_with_cancel`] to stop a transfer mid-body.
    ///
    /// # Errors
    /// `Channel`/`Protocol` on session failure
    pub async fn cancel(&mut self, transfer_id: &str) -> Result<()> {
        self.request(&ControlRequest::Cancel {
            transfer_id: transfer_id.to_string(),
        })
        .await?;

        match read_response(&mut self.control, &self.config).await? {
            ControlResponse::Cancelled { .. } => Ok(()),
            _ => Err(Error::protocol("unexpected reply to cancel")),
        }
    }

    /// Close both channels
    ///
    /// # Errors
    /// `Channel` if a channel fails to shut down cleanly
    pub async fn close(mut self) -> Result<()> {
        self.data.shutdown().await?;
        self.control.shutdown().await?;
        tracing::debug!(session = %self.session_id, "session closed");
        Ok(())
    }

    async fn request(&mut self, request: &ControlRequest) -> Result<()> {
        let line = control::encode_line(request)?;
        self.control.write_all(&line, self.config.io_timeout).await
    }
}

async fn read_response(
    control: &mut FramedChannel<BoxedChannel>,
    config: &SessionConfig,
) -> Result<ControlResponse> {
    let line = control
        .read_line(config.max_header_len, Some(config.io_timeout))
        .await?
        .ok_or(Error::Channel(ChannelError::Closed))?;
    control::decode_line(&line)
}

/// Random 128-bit transfer identifier, hex encoded
#[must_use]
pub fn new_transfer_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use huffstream_transport::{ChannelResult, SecureChannel, memory_pair};
    use std::sync::Mutex;

    /// Hands out prepared channels in order
    struct QueueConnector {
        channels: Mutex<Vec<BoxedChannel>>,
    }

    #[async_trait]
    impl Connector for QueueConnector {
        async fn connect(&self, _host: &str, _port: u16) -> ChannelResult<BoxedChannel> {
            let mut channels = self.channels.lock().unwrap();
            if channels.is_empty() {
                return Err(ChannelError::ConnectionFailed("no channel".into()));
            }
            Ok(channels.remove(0))
        }
    }

    #[test]
    fn test_transfer_ids_are_unique_hex() {
        let a = new_transfer_id();
        let b = new_transfer_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_busy_greeting() {
        let (client_side, mut server_side) = memory_pair(256);
        server_side
            .write_all(b"{\"status\":\"busy\",\"limit\":3}\n")
            .await
            .unwrap();

        let connector = QueueConnector {
            channels: Mutex::new(vec![Box::new(client_side)]),
        };
        let err = SessionClient::connect(
            &ServerEndpoint::new("test", 1, 2),
            SessionConfig::default(),
            &connector,
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.kind(), ErrorKind::SessionLimitExceeded);
        assert!(matches!(err, Error::SessionLimitExceeded { limit: 3 }));
    }

    #[tokio::test]
    async fn test_connect_sends_session_id_on_data_channel() {
        let (control_client, mut control_server) = memory_pair(256);
        let (data_client, data_server) = memory_pair(256);
        control_server
            .write_all(b"{\"status\":\"welcome\",\"session_id\":\"0011223344556677\"}\n")
            .await
            .unwrap();

        let connector = QueueConnector {
            channels: Mutex::new(vec![Box::new(control_client), Box::new(data_client)]),
        };
        let client = SessionClient::connect(
            &ServerEndpoint::new("test", 1, 2),
            SessionConfig::default(),
            &connector,
        )
        .await
        .unwrap();
        assert_eq!(client.session_id(), "0011223344556677");

        let mut data = FramedChannel::new(data_server, 64);
        let line = data
            .read_line(64, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(line.as_deref(), Some(&b"0011223344556677"[..]));
    }

    #[tokio::test]
    async fn test_send_with_cancel_mid_body() {
        let (control_client, mut control_server) = memory_pair(256);
        // too small for the body, so the send stalls until cancelled
        let (data_client, _data_server) = memory_pair(64);
        control_server
            .write_all(b"{\"status\":\"welcome\",\"session_id\":\"0011223344556677\"}\n")
            .await
            .unwrap();

        let connector = QueueConnector {
            channels: Mutex::new(vec![Box::new(control_client), Box::new(data_client)]),
        };
        let mut client = SessionClient::connect(
            &ServerEndpoint::new("test", 1, 2),
            SessionConfig::default(),
            &connector,
        )
        .await
        .unwrap();

        let server = tokio::spawn(async move {
            let timeout = Duration::from_secs(5);
            let mut control = FramedChannel::new(control_server, 256);

            let line = control.read_line(1024, Some(timeout)).await.unwrap().unwrap();
            let ControlRequest::Prepare { transfer_id, .. } = control::decode_line::<ControlRequest>(&line).unwrap()
            else {
                panic!("expected prepare");
            };
            let ready = control::encode_line(&ControlResponse::Ready {
                transfer_id: transfer_id.clone(),
            })
            .unwrap();
            control.write_all(&ready, timeout).await.unwrap();

            let line = control.read_line(1024, Some(timeout)).await.unwrap().unwrap();
            assert_eq!(
                control::decode_line::<ControlRequest>(&line).unwrap(),
                ControlRequest::Cancel {
                    transfer_id: transfer_id.clone()
                }
            );
            let cancelled = control::encode_line(&ControlResponse::Cancelled { transfer_id }).unwrap();
            control.write_all(&cancelled, timeout).await.unwrap();
        });

        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        let container = huffstream_codec::compress(&data).unwrap();
        let err = client
            .send_container_with_cancel("big.bin", &container, |_| {}, async {})
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(matches!(err, Error::Cancelled { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_greeting() {
        let (client_side, mut server_side) = memory_pair(256);
        server_side.write_all(b"{\"status\":\"ready\",\"transfer_id\":\"x\"}\n").await.unwrap();

        let connector = QueueConnector {
            channels: Mutex::new(vec![Box::new(client_side)]),
        };
        let err = SessionClient::connect(
            &ServerEndpoint::new("test", 1, 2),
            SessionConfig::default(),
            &connector,
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
