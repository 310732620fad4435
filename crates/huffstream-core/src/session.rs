//! Server side of one session.
//!
//! A session pairs one control channel with one data channel from the same
//! peer. It runs in its own task, owns both channels and one admission
//! permit, and ends when either channel closes, on a fatal protocol error,
//! or on server shutdown. Ending drops both channels and the permit.
//!
//! # Lifecycle
//!
//! ```text
//! control accepted ──► welcome{session_id} ──► wait for data channel
//!                                                   │ (first line = session_id)
//!                                                   ▼
//!              ┌────────────── command loop ◄───────┘
//!              │  prepare ──► ready ──► receive transfer ──► decode ──► sink ──► ack
//!              │  status  ──► transfer{state}
//!              │  cancel  ──► cancelled
//!              └─ control or data EOF / stray data bytes / fatal error ──► end
//! ```
//!
//! Between transfers the data channel must stay silent; any byte there
//! before `ready` ends the session.

use crate::config::SessionConfig;
use crate::control::{self, ControlRequest, ControlResponse, TransferStatus};
use crate::error::{Error, Result};
use crate::protocol::{Ack, FramedChannel, TransferHeader, TransferProtocol};
use crate::sink::{ReceivedTransfer, TransferSink};
use dashmap::DashMap;
use huffstream_transport::{BoxedChannel, ChannelError};
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, oneshot, watch};

/// Length of a session identifier in bytes
pub const SESSION_ID_LEN: usize = 8;

/// Transfer statuses a session remembers before evicting the oldest
pub const MAX_TRACKED_TRANSFERS: usize = 64;

/// Random identifier pairing a data channel with its control channel
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Fresh random identifier
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Identifier from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    /// Parse the hex form
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = hex::decode(text.trim()).ok()?;
        Some(Self(bytes.try_into().ok()?))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Data channel as handed from the binding task to its session
pub(crate) type DataChannel = FramedChannel<BoxedChannel>;

/// State shared by the accept loops and every session
pub(crate) struct SessionContext {
    pub(crate) config: SessionConfig,
    pub(crate) protocol: TransferProtocol,
    pub(crate) sink: Arc<dyn TransferSink>,
    /// Sessions waiting for their data channel
    pub(crate) pending: DashMap<SessionId, oneshot::Sender<DataChannel>>,
}

impl SessionContext {
    pub(crate) fn new(config: SessionConfig, sink: Arc<dyn TransferSink>) -> Self {
        Self {
            protocol: TransferProtocol::new(&config),
            config,
            sink,
            pending: DashMap::new(),
        }
    }
}

/// How one prepared transfer ended
enum TransferOutcome {
    Finished,
    Cancelled,
}

/// Status per transfer id, oldest entries evicted past a fixed capacity
struct TransferTable {
    statuses: HashMap<String, TransferStatus>,
    order: VecDeque<String>,
    capacity: usize,
}

impl TransferTable {
    fn new(capacity: usize) -> Self {
        Self {
            statuses: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, transfer_id: &str) -> TransferStatus {
        self.statuses
            .get(transfer_id)
            .copied()
            .unwrap_or(TransferStatus::Unknown)
    }

    fn set(&mut self, transfer_id: &str, status: TransferStatus) {
        if let Some(current) = self.statuses.get_mut(transfer_id) {
            *current = status;
            return;
        }

        self.statuses.insert(transfer_id.to_string(), status);
        self.order.push_back(transfer_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.statuses.remove(&oldest);
            }
        }
    }

    /// Mark a known, unfinished transfer cancelled
    fn cancel(&mut self, transfer_id: &str) {
        if let Some(status) = self.statuses.get_mut(transfer_id) {
            if !status.is_terminal() {
                *status = TransferStatus::Cancelled;
            }
        }
    }
}

pub(crate) struct Session {
    id: SessionId,
    context: Arc<SessionContext>,
    transfers: TransferTable,
}

impl Session {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self {
            id: SessionId::random(),
            context,
            transfers: TransferTable::new(MAX_TRACKED_TRANSFERS),
        }
    }

    /// Drive the session to completion, holding `permit` throughout
    pub(crate) async fn run(
        mut self,
        control: BoxedChannel,
        permit: OwnedSemaphorePermit,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let id = self.id;
        let context = Arc::clone(&self.context);
        let peer = control.peer_addr();
        tracing::info!(session = %id, ?peer, "session started");

        let result = tokio::select! {
            result = self.drive(control) => result,
            _ = shutdown.changed() => {
                tracing::debug!(session = %id, "session stopped by shutdown");
                Ok(())
            }
        };

        context.pending.remove(&id);
        drop(permit);

        match result {
            Ok(()) => tracing::info!(session = %id, "session ended"),
            Err(err) => tracing::warn!(session = %id, error = %err, "session failed"),
        }
    }

    async fn drive(&mut self, control: BoxedChannel) -> Result<()> {
        let config = &self.context.config;
        let mut control = FramedChannel::new(control, config.buffer_size);

        let (tx, rx) = oneshot::channel();
        self.context.pending.insert(self.id, tx);
        self.respond(
            &mut control,
            &ControlResponse::Welcome {
                session_id: self.id.to_string(),
            },
        )
        .await?;

        let mut data = match tokio::time::timeout(config.io_timeout, rx).await {
            Ok(Ok(data)) => data,
            Ok(Err(_)) => return Err(Error::protocol("data channel binding dropped")),
            Err(_) => {
                tracing::warn!(session = %self.id, "no data channel before timeout");
                return Err(ChannelError::TimedOut.into());
            }
        };
        tracing::debug!(session = %self.id, "data channel bound");

        loop {
            let line = tokio::select! {
                biased;
                line = control.read_line(self.context.config.max_header_len, None) => line?,
                buffered = data.readable() => {
                    return match buffered? {
                        0 => {
                            tracing::debug!(session = %self.id, "data channel closed");
                            Ok(())
                        }
                        bytes => {
                            tracing::warn!(session = %self.id, bytes, "data received outside a transfer");
                            Err(Error::protocol("data received outside a transfer"))
                        }
                    };
                }
            };
            let Some(line) = line else {
                break;
            };

            let request = match control::decode_line::<ControlRequest>(&line) {
                Ok(request) => request,
                Err(err) => {
                    self.respond(
                        &mut control,
                        &ControlResponse::Error {
                            message: err.to_string(),
                        },
                    )
                    .await?;
                    continue;
                }
            };

            match request {
                ControlRequest::Prepare {
                    transfer_id,
                    filename,
                    filesize,
                } => {
                    let outcome = self
                        .run_transfer(
                            &mut control,
                            &mut data,
                            transfer_id,
                            TransferHeader::new(filename, filesize),
                        )
                        .await?;
                    if let TransferOutcome::Cancelled = outcome {
                        // the data stream stopped mid-body and cannot be resynchronised
                        return Ok(());
                    }
                }
                ControlRequest::Status { transfer_id } => {
                    self.reply_status(&mut control, transfer_id).await?;
                }
                ControlRequest::Cancel { transfer_id } => {
                    self.transfers.cancel(&transfer_id);
                    self.respond(&mut control, &ControlResponse::Cancelled { transfer_id })
                        .await?;
                }
            }
        }

        tracing::debug!(session = %self.id, "control channel closed");
        Ok(())
    }

    /// Receive one prepared transfer while still serving the control channel
    async fn run_transfer(
        &mut self,
        control: &mut DataChannel,
        data: &mut DataChannel,
        transfer_id: String,
        expected: TransferHeader,
    ) -> Result<TransferOutcome> {
        let context = Arc::clone(&self.context);
        let id = self.id;

        self.transfers.set(&transfer_id, TransferStatus::Prepared);
        self.respond(
            control,
            &ControlResponse::Ready {
                transfer_id: transfer_id.clone(),
            },
        )
        .await?;
        self.transfers.set(&transfer_id, TransferStatus::Receiving);
        tracing::info!(
            session = %id,
            transfer = %transfer_id,
            name = %expected.name,
            size = expected.size,
            "receiving transfer"
        );

        let transfer = receive_transfer(&context, id, data, &transfer_id, expected);
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                result = &mut transfer => break result,
                line = control.read_line(context.config.max_header_len, None) => {
                    let Some(line) = line? else {
                        tracing::info!(session = %id, transfer = %transfer_id, "control closed mid-transfer");
                        return Err(ChannelError::Closed.into());
                    };

                    match control::decode_line::<ControlRequest>(&line) {
                        Ok(ControlRequest::Cancel { transfer_id: cancel_id }) if cancel_id == transfer_id => {
                            self.transfers.set(&transfer_id, TransferStatus::Cancelled);
                            tracing::info!(session = %id, transfer = %transfer_id, "transfer cancelled");
                            self.respond(control, &ControlResponse::Cancelled { transfer_id: cancel_id }).await?;
                            return Ok(TransferOutcome::Cancelled);
                        }
                        Ok(ControlRequest::Status { transfer_id: status_id }) => {
                            self.reply_status(control, status_id).await?;
                        }
                        Ok(_) => {
                            self.respond(control, &ControlResponse::Error {
                                message: "transfer in progress".to_string(),
                            }).await?;
                        }
                        Err(err) => {
                            self.respond(control, &ControlResponse::Error {
                                message: err.to_string(),
                            }).await?;
                        }
                    }
                }
            }
        };

        match result {
            Ok(status) => {
                self.transfers.set(&transfer_id, status);
                tracing::info!(session = %id, transfer = %transfer_id, ?status, "transfer finished");
                Ok(TransferOutcome::Finished)
            }
            Err(err) => {
                let status = match err {
                    Error::IncompleteTransfer { .. } => TransferStatus::Incomplete,
                    _ => TransferStatus::DecodeFailed,
                };
                self.transfers.set(&transfer_id, status);
                Err(err)
            }
        }
    }

    async fn reply_status(&self, control: &mut DataChannel, transfer_id: String) -> Result<()> {
        let state = self.transfers.get(&transfer_id);
        self.respond(control, &ControlResponse::Transfer { transfer_id, state })
            .await
    }

    async fn respond(&self, control: &mut DataChannel, response: &ControlResponse) -> Result<()> {
        let line = control::encode_line(response)?;
        control.write_all(&line, self.context.config.io_timeout).await
    }
}

/// Receive, decode, store and acknowledge one transfer
///
/// Decode and storage failures are answered with a rejection and reported
/// as `DecodeFailed`; the data channel stays usable. Framing failures are
/// returned as errors. Decoding runs on the blocking pool.
async fn receive_transfer(
    context: &SessionContext,
    session_id: SessionId,
    data: &mut DataChannel,
    transfer_id: &str,
    expected: TransferHeader,
) -> Result<TransferStatus> {
    let header = context.protocol.receive_header(data).await?;
    if header != expected {
        tracing::warn!(
            session = %session_id,
            expected = ?expected,
            received = ?header,
            "header does not match prepared transfer"
        );
        return Err(Error::protocol("header does not match prepared transfer"));
    }

    let pending = context.protocol.receive_body(data, header).await?;
    let message = pending.message();

    let stored = match decode_container(message.body.clone()).await {
        Ok((container, decoded)) => {
            let transfer = ReceivedTransfer {
                session_id,
                transfer_id: transfer_id.to_string(),
                name: message.name.clone(),
                container,
                data: decoded,
            };
            context.sink.store(&transfer).await
        }
        Err(err) => Err(err),
    };

    let (ack, status) = match stored {
        Ok(()) => (Ack::Complete, TransferStatus::Decoded),
        Err(err) => {
            tracing::warn!(
                session = %session_id,
                transfer = %transfer_id,
                kind = ?err.kind(),
                error = %err,
                "rejecting transfer"
            );
            (Ack::Rejected, TransferStatus::DecodeFailed)
        }
    };

    pending.acknowledge(ack).await?;
    Ok(status)
}

/// Verify and decode `container` off the async workers
///
/// Returns the container alongside its decoded bytes.
async fn decode_container(container: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>)> {
    tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Vec<u8>)> {
        let decoded = huffstream_codec::decompress(&container)?;
        Ok((container, decoded))
    })
    .await
    .map_err(|err| Error::Protocol(Cow::Owned(format!("decode task failed: {err}"))))?
}
