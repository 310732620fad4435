//! # HuffStream Transport
//!
//! Byte-stream plumbing for HuffStream sessions.
//!
//! This crate provides:
//! - The [`SecureChannel`] trait: an ordered, reliable byte stream that
//!   may or may not be wrapped in TLS by an outer layer
//! - [`StreamChannel`], adapting any tokio `AsyncRead + AsyncWrite` stream
//! - TCP [`Acceptor`]/[`Connector`] implementations with address reuse
//! - Connection retry with a fixed delay

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod retry;
pub mod tcp;

pub use channel::{
    BoxedChannel, ChannelError, ChannelResult, ChannelStats, SecureChannel, StreamChannel,
    memory_pair,
};
pub use retry::{RetryPolicy, connect_with_retry};
pub use tcp::{Acceptor, Connector, TcpAcceptor, TcpConnector, resolve};

/// Listen backlog for TCP acceptors
pub const DEFAULT_BACKLOG: i32 = 128;
