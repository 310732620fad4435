//! Framed transfer protocol.
//!
//! One transfer is a header line, an exact-length body and a fixed-size
//! acknowledgement:
//!
//! ```text
//! sender                                   receiver
//!   |---- "<name>|<size>\n" --------------->|  ReceiveHeader
//!   |---- <size> body bytes --------------->|  ReceiveBody
//!   |                                       |  (persist)
//!   |<--- "COMPLETE" | "REJECTED" ----------|  SendAck
//! ```
//!
//! The body may arrive in any number of reads, and bytes that arrive in the
//! same read as the header are kept. A channel that closes or stalls before
//! `size` bytes arrive fails with `IncompleteTransfer` and the partial body
//! is dropped.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use huffstream_transport::{ChannelError, SecureChannel};
use std::fmt;
use std::time::Duration;

/// Length of every acknowledgement
pub const ACK_LEN: usize = 8;

/// Header name/size separator
pub const HEADER_SEPARATOR: char = '|';

/// Header terminator
pub const LINE_DELIMITER: u8 = b'\n';

/// Upper bound on body bytes reserved before they arrive
const MAX_PREALLOC: u64 = 1 << 20;

/// Receiver's verdict on a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Body received and persisted
    Complete,
    /// Body received but could not be decoded or persisted
    Rejected,
}

impl Ack {
    /// Wire form
    #[must_use]
    pub const fn as_bytes(&self) -> &'static [u8; ACK_LEN] {
        match self {
            Ack::Complete => b"COMPLETE",
            Ack::Rejected => b"REJECTED",
        }
    }

    /// Parse the wire form
    ///
    /// # Errors
    /// Returns `Protocol` for any other 8 bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"COMPLETE" => Ok(Ack::Complete),
            b"REJECTED" => Ok(Ack::Rejected),
            _ => Err(Error::protocol("unrecognised acknowledgement")),
        }
    }
}

/// Parsed transfer header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// Transfer name, usually a file name
    pub name: String,
    /// Exact body length in bytes
    pub size: u64,
}

impl TransferHeader {
    /// Create a header
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Wire form including the trailing delimiter
    ///
    /// # Errors
    /// Returns `Protocol` if the name is empty or contains a newline
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.name.is_empty() {
            return Err(Error::protocol("transfer name is empty"));
        }
        if self.name.contains('\n') {
            return Err(Error::protocol("transfer name contains a newline"));
        }
        Ok(format!("{}{HEADER_SEPARATOR}{}\n", self.name, self.size).into_bytes())
    }

    /// Parse a header line without its delimiter
    ///
    /// The last separator splits name from size, so names may contain `|`.
    ///
    /// # Errors
    /// Returns `Protocol` for non-UTF-8 input, a missing separator, an
    /// empty name, or a size that is not a decimal `u64`
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = std::str::from_utf8(line).map_err(|_| Error::protocol("header is not UTF-8"))?;
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (name, size) = line
            .rsplit_once(HEADER_SEPARATOR)
            .ok_or(Error::protocol("header missing separator"))?;
        if name.is_empty() {
            return Err(Error::protocol("transfer name is empty"));
        }
        let size = size
            .parse::<u64>()
            .map_err(|_| Error::protocol("header size is not a number"))?;

        Ok(Self::new(name, size))
    }
}

/// One named body received in full
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMessage {
    /// Name from the header
    pub name: String,
    /// Exactly the declared number of bytes
    pub body: Vec<u8>,
}

impl TransferMessage {
    /// Body length
    #[must_use]
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Sender progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing sent
    Idle,
    /// Writing the header line
    SendHeader,
    /// Writing body chunks
    SendBody,
    /// Waiting for the receiver's verdict
    AwaitAck,
    /// Acknowledged
    Done,
}

/// Receiver progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Nothing read
    Idle,
    /// Reading the header line
    ReceiveHeader,
    /// Accumulating body bytes
    ReceiveBody,
    /// Body held, verdict not yet written
    SendAck,
    /// Verdict written
    Done,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Buffered reader/writer over a [`SecureChannel`]
///
/// Bytes read past a line delimiter stay buffered for the next call, so a
/// header and the start of its body may share one read.
pub struct FramedChannel<C> {
    channel: C,
    buffer: Vec<u8>,
    scratch: Vec<u8>,
}

impl<C: SecureChannel> FramedChannel<C> {
    /// Wrap `channel`, reading at most `chunk_size` bytes per call
    pub fn new(channel: C, chunk_size: usize) -> Self {
        Self {
            channel,
            buffer: Vec::new(),
            scratch: vec![0; chunk_size.max(1)],
        }
    }

    /// Underlying channel
    pub fn get_ref(&self) -> &C {
        &self.channel
    }

    /// Bytes read from the channel but not yet consumed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Unwrap the channel, discarding buffered bytes
    pub fn into_inner(self) -> C {
        self.channel
    }

    async fn fill(&mut self, timeout: Option<Duration>) -> std::result::Result<usize, ChannelError> {
        let read = self.channel.read(&mut self.scratch);
        let n = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, read)
                .await
                .map_err(|_| ChannelError::TimedOut)??,
            None => read.await?,
        };
        self.buffer.extend_from_slice(&self.scratch[..n]);
        Ok(n)
    }

    /// Read one delimited line, delimiter stripped
    ///
    /// Returns `None` if the channel closes cleanly before any byte of a
    /// new line. With `timeout` of `None` each read waits indefinitely.
    /// Cancelling the returned future loses no data.
    ///
    /// # Errors
    /// `Protocol` if the line exceeds `max_len` or the channel closes
    /// mid-line; `Channel` on read failure or timeout
    pub async fn read_line(
        &mut self,
        max_len: usize,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let mut searched = 0;
        loop {
            if let Some(offset) = self.buffer[searched..]
                .iter()
                .position(|&b| b == LINE_DELIMITER)
            {
                let end = searched + offset;
                if end + 1 > max_len {
                    return Err(Error::protocol("line exceeds maximum length"));
                }
                let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
                line.pop();
                return Ok(Some(line));
            }

            searched = self.buffer.len();
            if searched >= max_len {
                return Err(Error::protocol("line exceeds maximum length"));
            }

            if self.fill(timeout).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::protocol("channel closed mid-line"));
            }
        }
    }

    /// Wait until bytes are buffered or the channel closes
    ///
    /// Returns the number of buffered bytes, `0` once the channel has closed.
    /// Cancelling the returned future loses no data.
    ///
    /// # Errors
    /// `Channel` on read failure
    pub async fn readable(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            self.fill(None).await?;
        }
        Ok(self.buffer.len())
    }

    /// Read exactly `size` body bytes
    ///
    /// Never reads past the body, so whatever follows stays in the channel.
    ///
    /// # Errors
    /// `IncompleteTransfer` if the channel closes, fails, or stalls for
    /// `timeout` before `size` bytes arrive
    pub async fn read_body(&mut self, size: u64, timeout: Duration) -> Result<Vec<u8>> {
        let buffered = (self.buffer.len() as u64).min(size) as usize;
        let mut body = Vec::with_capacity(size.min(MAX_PREALLOC) as usize);
        body.extend(self.buffer.drain(..buffered));

        while (body.len() as u64) < size {
            let want = (size - body.len() as u64).min(self.scratch.len() as u64) as usize;
            let incomplete = Error::IncompleteTransfer {
                expected: size,
                received: body.len() as u64,
            };

            match tokio::time::timeout(timeout, self.channel.read(&mut self.scratch[..want])).await {
                Ok(Ok(0)) => {
                    tracing::debug!(expected = size, received = body.len(), "channel closed mid-body");
                    return Err(incomplete);
                }
                Ok(Ok(n)) => body.extend_from_slice(&self.scratch[..n]),
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, received = body.len(), "read failed mid-body");
                    return Err(incomplete);
                }
                Err(_) => {
                    tracing::debug!(expected = size, received = body.len(), "body read timed out");
                    return Err(incomplete);
                }
            }
        }

        Ok(body)
    }

    /// Read exactly `len` bytes of framing
    ///
    /// # Errors
    /// `Channel(Closed)` if the channel closes first; `Channel` on read
    /// failure or timeout
    pub async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        while self.buffer.len() < len {
            if self.fill(Some(timeout)).await? == 0 {
                return Err(ChannelError::Closed.into());
            }
        }
        Ok(self.buffer.drain(..len).collect())
    }

    /// Write all of `bytes` within `timeout`
    ///
    /// # Errors
    /// `Channel` on write failure or timeout
    pub async fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.channel.write_all(bytes))
            .await
            .map_err(|_| ChannelError::TimedOut)??;
        Ok(())
    }

    /// Close the write half
    ///
    /// # Errors
    /// `Channel` on failure
    pub async fn shutdown(&mut self) -> Result<()> {
        self.channel.shutdown().await?;
        Ok(())
    }
}

/// Sender and receiver halves of the transfer protocol
#[derive(Debug, Clone)]
pub struct TransferProtocol {
    buffer_size: usize,
    io_timeout: Duration,
    max_header_len: usize,
}

impl TransferProtocol {
    /// Protocol tuned by `config`
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            buffer_size: config.buffer_size.max(1),
            io_timeout: config.io_timeout,
            max_header_len: config.max_header_len,
        }
    }

    /// Send one transfer and wait for its acknowledgement
    ///
    /// `progress` is called with the cumulative body bytes written after
    /// each chunk.
    ///
    /// # Errors
    /// `Protocol` for an invalid name or unknown ack, `Rejected` if the
    /// receiver rejects, `Channel` on channel failure
    pub async fn send<C: SecureChannel>(
        &self,
        channel: &mut FramedChannel<C>,
        name: &str,
        body: &[u8],
        progress: impl FnMut(u64) + Send,
    ) -> Result<()> {
        let mut state = SenderState::Idle;
        let result = self
            .send_stages(channel, name, body, progress, &mut state)
            .await;

        if let Err(err) = &result {
            tracing::debug!(name, %state, error = %err, "send failed");
        }
        result
    }

    async fn send_stages<C: SecureChannel>(
        &self,
        channel: &mut FramedChannel<C>,
        name: &str,
        body: &[u8],
        mut progress: impl FnMut(u64) + Send,
        state: &mut SenderState,
    ) -> Result<()> {
        let header = TransferHeader::new(name, body.len() as u64).encode()?;
        if header.len() > self.max_header_len {
            return Err(Error::protocol("header exceeds maximum length"));
        }

        *state = SenderState::SendHeader;
        tracing::trace!(name, size = body.len(), state = %state, "sending header");
        channel.write_all(&header, self.io_timeout).await?;

        *state = SenderState::SendBody;
        let mut sent = 0u64;
        for chunk in body.chunks(self.buffer_size) {
            channel.write_all(chunk, self.io_timeout).await?;
            sent += chunk.len() as u64;
            progress(sent);
        }

        *state = SenderState::AwaitAck;
        tracing::trace!(name, state = %state, "body sent");
        let ack = Ack::parse(&channel.read_exact(ACK_LEN, self.io_timeout).await?)?;

        *state = SenderState::Done;
        match ack {
            Ack::Complete => Ok(()),
            Ack::Rejected => Err(Error::Rejected(name.to_string())),
        }
    }

    /// Receive one header and its body
    ///
    /// The returned handle must be acknowledged once the body has been
    /// persisted (or rejected if that failed).
    ///
    /// # Errors
    /// `Channel(Closed)` if the channel closes before a header,
    /// `Protocol` for a bad header, `IncompleteTransfer` for a short body
    pub async fn receive<'a, C: SecureChannel>(
        &self,
        channel: &'a mut FramedChannel<C>,
    ) -> Result<PendingAck<'a, C>> {
        let header = self.receive_header(channel).await?;
        self.receive_body(channel, header).await
    }

    /// Receive a header line only
    ///
    /// # Errors
    /// See [`TransferProtocol::receive`]
    pub async fn receive_header<C: SecureChannel>(
        &self,
        channel: &mut FramedChannel<C>,
    ) -> Result<TransferHeader> {
        tracing::trace!(state = %ReceiverState::ReceiveHeader, "awaiting header");
        let line = channel
            .read_line(self.max_header_len, Some(self.io_timeout))
            .await?
            .ok_or(Error::Channel(ChannelError::Closed))?;
        TransferHeader::parse(&line)
    }

    /// Receive the body announced by `header`
    ///
    /// # Errors
    /// `IncompleteTransfer` if the body is cut short
    pub async fn receive_body<'a, C: SecureChannel>(
        &self,
        channel: &'a mut FramedChannel<C>,
        header: TransferHeader,
    ) -> Result<PendingAck<'a, C>> {
        tracing::trace!(
            name = %header.name,
            size = header.size,
            state = %ReceiverState::ReceiveBody,
            "receiving body"
        );
        let body = channel.read_body(header.size, self.io_timeout).await?;

        Ok(PendingAck {
            message: TransferMessage {
                name: header.name,
                body,
            },
            channel,
            io_timeout: self.io_timeout,
        })
    }
}

/// A fully received transfer whose acknowledgement is still owed
#[must_use = "the sender waits for an acknowledgement"]
pub struct PendingAck<'a, C> {
    message: TransferMessage,
    channel: &'a mut FramedChannel<C>,
    io_timeout: Duration,
}

impl<C: SecureChannel> PendingAck<'_, C> {
    /// Received message
    pub fn message(&self) -> &TransferMessage {
        &self.message
    }

    /// Current state
    pub fn state(&self) -> ReceiverState {
        ReceiverState::SendAck
    }

    /// Write the verdict and release the message
    ///
    /// # Errors
    /// `Channel` if the acknowledgement cannot be written
    pub async fn acknowledge(self, ack: Ack) -> Result<TransferMessage> {
        self.channel.write_all(ack.as_bytes(), self.io_timeout).await?;
        tracing::trace!(
            name = %self.message.name,
            ?ack,
            state = %ReceiverState::Done,
            "acknowledged"
        );
        Ok(self.message)
    }
}
