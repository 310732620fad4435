//! # HuffStream Core
//!
//! Transfer protocol and session handling for HuffStream.
//!
//! This crate provides:
//! - Framed transfers (`<name>|<size>\n`, body, 8-byte acknowledgement)
//!   that survive arbitrary partial reads
//! - The JSON control channel (prepare/status/cancel)
//! - A server with a hard bound on concurrent sessions
//! - A client that opens a session and sends compressed files
//! - Error kinds shared by every layer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SessionManager                         │
//! │   control accept loop ── admission permit ── session task    │
//! │   data accept loop ───── session id line ─── rendezvous      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                          Session                             │
//! │   control channel (JSON lines) + data channel (transfers)    │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     TransferProtocol                         │
//! │   header, exact-length body, COMPLETE / REJECTED ack         │
//! ├──────────────────────────────────────────────────────────────┤
//! │              huffstream-codec container format               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod protocol;
pub mod session;
pub mod session_manager;
pub mod sink;

pub use client::{SessionClient, TransferReport, new_transfer_id};
pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_IO_TIMEOUT, DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_SESSIONS,
    ServerEndpoint, SessionConfig,
};
pub use control::{ControlRequest, ControlResponse, TransferStatus};
pub use error::{Error, ErrorKind, Result};
pub use protocol::{
    ACK_LEN, Ack, FramedChannel, PendingAck, ReceiverState, SenderState, TransferHeader,
    TransferMessage, TransferProtocol,
};
pub use session::{MAX_TRACKED_TRANSFERS, SESSION_ID_LEN, SessionId};
pub use session_manager::{RunningServer, SessionManager};
pub use sink::{MemorySink, ReceivedTransfer, TransferSink};
