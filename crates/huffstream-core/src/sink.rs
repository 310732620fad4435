//! Destination for decoded transfers.

use crate::error::Result;
use crate::session::SessionId;
use async_trait::async_trait;
use std::sync::Mutex;

/// One transfer after a successful decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedTransfer {
    /// Session that received it
    pub session_id: SessionId,
    /// Client-chosen transfer identifier
    pub transfer_id: String,
    /// Name from the transfer header
    pub name: String,
    /// Container exactly as received
    pub container: Vec<u8>,
    /// Decoded original bytes
    pub data: Vec<u8>,
}

/// Persists received transfers
///
/// `store` runs before the acknowledgement is written; an error turns the
/// acknowledgement into a rejection.
#[async_trait]
pub trait TransferSink: Send + Sync {
    /// Persist one transfer
    ///
    /// # Errors
    /// Return `Storage` if the transfer could not be persisted
    async fn store(&self, transfer: &ReceivedTransfer) -> Result<()>;
}

/// Keeps every transfer in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    transfers: Mutex<Vec<ReceivedTransfer>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored transfers, oldest first
    #[must_use]
    pub fn transfers(&self) -> Vec<ReceivedTransfer> {
        self.transfers
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of stored transfers
    #[must_use]
    pub fn len(&self) -> usize {
        self.transfers.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// True if nothing has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TransferSink for MemorySink {
    async fn store(&self, transfer: &ReceivedTransfer) -> Result<()> {
        self.transfers
            .lock()
            .map_err(|_| crate::error::Error::Storage("memory sink poisoned".into()))?
            .push(transfer.clone());
        Ok(())
    }
}
