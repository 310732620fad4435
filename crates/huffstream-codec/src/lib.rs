//! # HuffStream Codec
//!
//! Static byte-level Huffman coding and the self-describing container that
//! carries encoded data on disk and over the wire.
//!
//! This crate provides:
//! - Frequency analysis with first-seen ordering
//! - Deterministic tree construction (ties broken by insertion sequence)
//! - MSB-first bit packing and unpacking
//! - Container packing, validation and integrity checking
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──► FrequencyTable ──► HuffmanTree ──► encode ──► pack ──► blob
//! blob  ──► unpack ──► Container ──► decode ──► verify digest ──► bytes
//! ```
//!
//! ## Example
//!
//! ```
//! let blob = huffstream_codec::compress(b"abracadabra").unwrap();
//! let data = huffstream_codec::decompress(&blob).unwrap();
//! assert_eq!(data, b"abracadabra");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitio;
pub mod codec;
pub mod container;
pub mod error;
pub mod frequency;
pub mod tree;

pub use codec::{EncodedPayload, decode, encode};
pub use container::{
    CompressionStats, Container, DIGEST_LEN, HEADER_LEN, compress, compress_with_stats,
    decompress, pack, unpack,
};
pub use error::{CodecError, Result};
pub use frequency::FrequencyTable;
pub use tree::{Code, CodeTable, HuffmanTree, MAX_CODE_LEN, Node};

/// File extension used for container files
pub const CONTAINER_EXTENSION: &str = "huff";
