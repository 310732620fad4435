//! Self-describing container blob.
//!
//! ```text
//! [1  byte ] padding bit count (0-7)
//! [8  bytes] original length, u64 big-endian
//! [32 bytes] BLAKE3 digest of the original bytes
//! [2  bytes] tree length in bytes, u16 big-endian
//! [n  bytes] serialized code tree
//! [.. bytes] encoded payload
//! ```
//!
//! A container decodes without any session state, so the same blob is both
//! the on-disk `.huff` file and the body of a network transfer.

use crate::codec::{self, EncodedPayload};
use crate::error::{CodecError, Result};
use crate::frequency::FrequencyTable;
use crate::tree::{CodeTable, HuffmanTree};

/// Length of the BLAKE3 digest stored in the header
pub const DIGEST_LEN: usize = 32;

/// Fixed header bytes preceding the serialized tree
pub const HEADER_LEN: usize = 1 + 8 + DIGEST_LEN + 2;

/// Parsed container
#[derive(Debug, Clone)]
pub struct Container {
    tree: HuffmanTree,
    payload: EncodedPayload,
    digest: [u8; DIGEST_LEN],
}

impl Container {
    /// Code tree carried by the container
    #[must_use]
    pub fn tree(&self) -> &HuffmanTree {
        &self.tree
    }

    /// Code table derived from the carried tree
    #[must_use]
    pub fn code_table(&self) -> &CodeTable {
        self.tree.code_table()
    }

    /// Encoded payload
    #[must_use]
    pub fn payload(&self) -> &EncodedPayload {
        &self.payload
    }

    /// Padding bits in the last payload byte
    #[must_use]
    pub fn padding(&self) -> u8 {
        self.payload.padding
    }

    /// Length of the original data in bytes
    #[must_use]
    pub fn original_len(&self) -> u64 {
        self.payload.symbol_count
    }

    /// BLAKE3 digest of the original data
    #[must_use]
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Decode the payload and check it against the stored digest
    ///
    /// # Errors
    /// Returns `CorruptPayload` if decoding fails or the digest differs.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let data = codec::decode(&self.payload, &self.tree)?;
        if blake3::hash(&data).as_bytes() != &self.digest {
            return Err(CodecError::corrupt("checksum mismatch"));
        }
        Ok(data)
    }
}

/// Serialize a payload and its tree into a container blob
///
/// # Errors
/// Returns `MalformedContainer` if the serialized tree does not fit the
/// 16-bit length field.
pub fn pack(
    payload: &EncodedPayload,
    tree: &HuffmanTree,
    digest: &[u8; DIGEST_LEN],
) -> Result<Vec<u8>> {
    let tree_bytes = tree.serialize();
    let tree_len = u16::try_from(tree_bytes.len())
        .map_err(|_| CodecError::malformed("serialized tree exceeds 65535 bytes"))?;

    let mut blob = Vec::with_capacity(HEADER_LEN + tree_bytes.len() + payload.bytes.len());
    blob.push(payload.padding);
    blob.extend_from_slice(&payload.symbol_count.to_be_bytes());
    blob.extend_from_slice(digest);
    blob.extend_from_slice(&tree_len.to_be_bytes());
    blob.extend_from_slice(&tree_bytes);
    blob.extend_from_slice(&payload.bytes);
    Ok(blob)
}

/// Parse and validate a container blob
///
/// Nothing is returned unless every header field is consistent with the
/// rest of the blob.
///
/// # Errors
/// Returns `MalformedContainer` on a short header, padding above 7, a tree
/// length past the end of the blob, an unparseable tree, a tree that
/// disagrees with the original length, or a payload too short to hold one
/// bit per original byte.
pub fn unpack(blob: &[u8]) -> Result<Container> {
    let Some((header, rest)) = blob.split_first_chunk::<HEADER_LEN>() else {
        return Err(CodecError::malformed("short container header"));
    };

    let padding = header[0];
    if padding > 7 {
        return Err(CodecError::malformed("padding out of range"));
    }

    let mut length_bytes = [0u8; 8];
    length_bytes.copy_from_slice(&header[1..9]);
    let original_len = u64::from_be_bytes(length_bytes);

    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&header[9..9 + DIGEST_LEN]);

    let tree_len = u16::from_be_bytes([header[HEADER_LEN - 2], header[HEADER_LEN - 1]]) as usize;
    if tree_len > rest.len() {
        return Err(CodecError::malformed("tree length exceeds container"));
    }
    let (tree_bytes, payload_bytes) = rest.split_at(tree_len);

    let tree = HuffmanTree::deserialize(tree_bytes)?;
    if tree.is_empty() != (original_len == 0) {
        return Err(CodecError::malformed("code tree disagrees with original length"));
    }
    if padding > 0 && payload_bytes.is_empty() {
        return Err(CodecError::malformed("padding without payload"));
    }

    let payload = EncodedPayload {
        bytes: payload_bytes.to_vec(),
        padding,
        symbol_count: original_len,
    };
    if payload.bit_len() < original_len {
        return Err(CodecError::malformed("payload shorter than original length"));
    }

    Ok(Container {
        tree,
        payload,
        digest,
    })
}

/// Size summary for one compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    /// Bytes before compression
    pub original_size: u64,
    /// Bytes of the finished container
    pub container_size: u64,
}

impl CompressionStats {
    /// Container size as a fraction of the original (1.0 for empty input)
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.container_size as f64 / self.original_size as f64
    }

    /// Percentage of bytes saved, negative when the container is larger
    #[must_use]
    pub fn savings_percent(&self) -> f64 {
        (1.0 - self.ratio()) * 100.0
    }
}

/// Build a tree from `data`, encode it and pack the result
///
/// # Errors
/// Never fails for trees built from the input; the `Result` carries
/// [`pack`] errors through.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with_stats(data).map(|(blob, _)| blob)
}

/// [`compress`] that also reports sizes
///
/// # Errors
/// See [`compress`].
pub fn compress_with_stats(data: &[u8]) -> Result<(Vec<u8>, CompressionStats)> {
    let tree = HuffmanTree::build(&FrequencyTable::build(data));
    let payload = codec::encode(data, &tree)?;
    let blob = pack(&payload, &tree, blake3::hash(data).as_bytes())?;

    let stats = CompressionStats {
        original_size: data.len() as u64,
        container_size: blob.len() as u64,
    };
    tracing::debug!(
        original = stats.original_size,
        container = stats.container_size,
        "compressed"
    );
    Ok((blob, stats))
}

/// Unpack, decode and verify a container blob
///
/// # Errors
/// `MalformedContainer` from [`unpack`], `CorruptPayload` from decoding or
/// the digest check.
pub fn decompress(blob: &[u8]) -> Result<Vec<u8>> {
    unpack(blob)?.decode()
}
