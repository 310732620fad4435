//! Control channel messages.
//!
//! Newline-delimited JSON. Requests carry a `command` tag, responses a
//! `status` tag:
//!
//! ```text
//! -> {"command":"prepare","transfer_id":"..","filename":"..","filesize":N}
//! <- {"status":"ready","transfer_id":".."}
//! -> {"command":"status","transfer_id":".."}
//! <- {"status":"transfer","transfer_id":"..","state":"decoded"}
//! -> {"command":"cancel","transfer_id":".."}
//! <- {"status":"cancelled","transfer_id":".."}
//! ```
//!
//! The server opens every control connection with either `welcome` or
//! `busy`.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Announce the next transfer on the data channel
    Prepare {
        /// Client-chosen transfer identifier
        transfer_id: String,
        /// Name the data header will carry
        filename: String,
        /// Body size the data header will carry
        filesize: u64,
    },
    /// Ask for a transfer's state
    Status {
        /// Transfer identifier
        transfer_id: String,
    },
    /// Abort a prepared or in-flight transfer
    Cancel {
        /// Transfer identifier
        transfer_id: String,
    },
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    /// Session admitted
    Welcome {
        /// Identifier the client echoes as the first data channel line
        session_id: String,
    },
    /// Session refused at the concurrency bound
    Busy {
        /// Configured bound
        limit: usize,
    },
    /// Server is waiting for the prepared transfer
    Ready {
        /// Transfer identifier
        transfer_id: String,
    },
    /// Reply to a status request
    Transfer {
        /// Transfer identifier
        transfer_id: String,
        /// Current state
        state: TransferStatus,
    },
    /// Transfer cancelled
    Cancelled {
        /// Transfer identifier
        transfer_id: String,
    },
    /// Request could not be served; the session continues
    Error {
        /// Human-readable reason
        message: String,
    },
}

/// Per-transfer state tracked by the serving session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Announced, data not yet arriving
    Prepared,
    /// Body in flight
    Receiving,
    /// Decoded and handed to the sink
    Decoded,
    /// Container failed to decode or persist
    DecodeFailed,
    /// Body cut short
    Incomplete,
    /// Cancelled by the client
    Cancelled,
    /// Never prepared in this session
    Unknown,
}

impl TransferStatus {
    /// True once no further change is possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Decoded
                | TransferStatus::DecodeFailed
                | TransferStatus::Incomplete
                | TransferStatus::Cancelled
        )
    }
}

/// Serialize `message` as one delimited line
///
/// # Errors
/// Returns `Protocol` if serialization fails
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| Error::Protocol(Cow::Owned(format!("cannot encode control message: {e}"))))?;
    line.push(b'\n');
    Ok(line)
}

/// Parse one line (delimiter stripped)
///
/// # Errors
/// Returns `Protocol` for invalid JSON or an unknown message
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    serde_json::from_slice(line)
        .map_err(|e| Error::Protocol(Cow::Owned(format!("invalid control message: {e}"))))
}
