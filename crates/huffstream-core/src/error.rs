//! Error types for the HuffStream core.
//!
//! Every failure maps to a stable [`ErrorKind`] so callers and tests can
//! assert on the condition rather than on message text.
//!
//! # Propagation
//!
//! - Codec and container errors abort the one transfer that hit them
//! - Channel errors and incomplete transfers end the owning session only
//! - `SessionLimitExceeded` is reported when the connection is refused

use huffstream_codec::CodecError;
use huffstream_transport::ChannelError;
use std::borrow::Cow;
use thiserror::Error;

/// Core errors
#[derive(Debug, Error)]
pub enum Error {
    // ============ Codec Errors ============
    /// Payload or container failed to decode
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ============ Transfer Errors ============
    /// Channel closed or timed out before the declared body arrived
    #[error("incomplete transfer: received {received} of {expected} bytes")]
    IncompleteTransfer {
        /// Declared body length
        expected: u64,
        /// Bytes received before the failure
        received: u64,
    },

    /// Receiver answered with a rejection
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// Sender cancelled the transfer before its acknowledgement
    #[error("transfer {transfer_id} cancelled")]
    Cancelled {
        /// Identifier of the cancelled transfer
        transfer_id: String,
    },

    /// Peer violated the wire protocol
    #[error("protocol error: {0}")]
    Protocol(Cow<'static, str>),

    // ============ Session Errors ============
    /// Server is at its concurrent session bound
    #[error("session limit exceeded (limit {limit})")]
    SessionLimitExceeded {
        /// Configured bound
        limit: usize,
    },

    /// Underlying channel failed
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    // ============ Collaborator Errors ============
    /// Transfer sink failed to persist the result
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

/// Stable classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bit stream does not resolve to the declared symbols
    CorruptPayload,
    /// Container metadata failed validation
    MalformedContainer,
    /// Body shorter than declared
    IncompleteTransfer,
    /// Connection refused at the session bound
    SessionLimitExceeded,
    /// Channel read/write failure
    ChannelError,
    /// Wire protocol violation
    Protocol,
    /// Receiver refused the transfer
    Rejected,
    /// Transfer cancelled by the sender
    Cancelled,
    /// Persisting the transfer failed
    Storage,
    /// Configuration rejected
    InvalidConfig,
}

impl Error {
    /// Stable kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Codec(CodecError::MalformedContainer(_)) => ErrorKind::MalformedContainer,
            Error::Codec(CodecError::CorruptPayload(_) | CodecError::UnknownSymbol(_)) => {
                ErrorKind::CorruptPayload
            }
            Error::IncompleteTransfer { .. } => ErrorKind::IncompleteTransfer,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::SessionLimitExceeded { .. } => ErrorKind::SessionLimitExceeded,
            Error::Channel(_) => ErrorKind::ChannelError,
            Error::Storage(_) => ErrorKind::Storage,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Returns true if a retry orchestrator may try again
    ///
    /// Connection-level failures and a full server are transient; codec,
    /// protocol and configuration failures are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Channel(err) => err.is_transient(),
            Error::IncompleteTransfer { .. } | Error::SessionLimitExceeded { .. } => true,
            _ => false,
        }
    }

    /// Create a protocol error with static context (zero allocation)
    #[must_use]
    pub const fn protocol(context: &'static str) -> Self {
        Error::Protocol(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        Error::InvalidConfig(Cow::Borrowed(context))
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
