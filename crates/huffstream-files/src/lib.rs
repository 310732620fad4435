//! # HuffStream Files
//!
//! File I/O around the HuffStream codec and transfer protocol.
//!
//! This crate provides:
//! - Encoding a file into a container and decoding it back
//! - [`DirectorySink`], which stores received transfers on disk
//! - The `_encoded` / `_decoded` naming convention

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod error;
pub mod naming;
pub mod transcode;

pub use directory::{DirectorySink, StoredPaths};
pub use error::{FileError, Result};
pub use naming::{decoded_name, encoded_name, sanitize};
pub use transcode::{decode_file, encode_file};
