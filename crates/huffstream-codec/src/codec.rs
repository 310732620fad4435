//! Encoding and decoding of symbol streams against a Huffman tree.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::tree::{HuffmanTree, Node};

/// Concatenated codes, zero-padded to a byte boundary
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedPayload {
    /// Packed bits, MSB-first
    pub bytes: Vec<u8>,
    /// Zero bits appended to the last byte (0-7)
    pub padding: u8,
    /// Number of symbols encoded
    pub symbol_count: u64,
}

impl EncodedPayload {
    /// Number of meaningful bits (excludes padding)
    #[must_use]
    pub fn bit_len(&self) -> u64 {
        (self.bytes.len() as u64 * 8).saturating_sub(u64::from(self.padding))
    }
}

/// Replace every byte of `data` with its code from `tree`
///
/// # Errors
/// Returns `UnknownSymbol` if `data` contains a byte the tree has no code
/// for. A tree built from `data`'s own frequencies always covers it.
pub fn encode(data: &[u8], tree: &HuffmanTree) -> Result<EncodedPayload> {
    let table = tree.code_table();
    let mut writer = BitWriter::with_capacity(data.len() / 2 + 1);

    for &byte in data {
        table
            .get(byte)
            .ok_or(CodecError::UnknownSymbol(byte))?
            .write_to(&mut writer);
    }

    let (bytes, padding) = writer.finish();
    tracing::trace!(
        symbols = data.len(),
        encoded_bytes = bytes.len(),
        padding,
        "encoded payload"
    );

    Ok(EncodedPayload {
        bytes,
        padding,
        symbol_count: data.len() as u64,
    })
}

/// Walk `tree` over the payload bits and emit one symbol per leaf reached
///
/// # Errors
/// Returns `CorruptPayload` when the bit stream ends mid-code, when the
/// number of decoded symbols differs from `symbol_count`, when padding is
/// out of range, or when bits are present but the tree is empty.
pub fn decode(payload: &EncodedPayload, tree: &HuffmanTree) -> Result<Vec<u8>> {
    if payload.padding > 7 {
        return Err(CodecError::corrupt("padding exceeds 7 bits"));
    }
    if payload.padding > 0 && payload.bytes.is_empty() {
        return Err(CodecError::corrupt("padding without payload bytes"));
    }

    let bit_len = payload.bit_len();
    let Some(root) = tree.root() else {
        if bit_len == 0 && payload.symbol_count == 0 {
            return Ok(Vec::new());
        }
        return Err(CodecError::corrupt("payload bits without a code tree"));
    };

    let expected = payload.symbol_count;
    let mut output = Vec::with_capacity(expected.min(bit_len) as usize);
    let mut reader = BitReader::with_limit(&payload.bytes, bit_len);

    match *tree.node(root) {
        Node::Leaf { symbol, .. } => {
            while let Some(bit) = reader.read_bit() {
                if bit {
                    return Err(CodecError::corrupt("unexpected 1 bit in single-symbol stream"));
                }
                output.push(symbol);
            }
        }
        Node::Internal { .. } => {
            let mut cursor = root;
            while let Some(bit) = reader.read_bit() {
                cursor = match *tree.node(cursor) {
                    Node::Internal { left, right, .. } => {
                        if bit {
                            right
                        } else {
                            left
                        }
                    }
                    Node::Leaf { .. } => return Err(CodecError::corrupt("decoder left the tree")),
                };

                if let Node::Leaf { symbol, .. } = *tree.node(cursor) {
                    if output.len() as u64 == expected {
                        return Err(CodecError::corrupt("more symbols than declared"));
                    }
                    output.push(symbol);
                    cursor = root;
                }
            }

            if cursor != root {
                return Err(CodecError::corrupt("bit stream ended mid-code"));
            }
        }
    }

    if output.len() as u64 != expected {
        return Err(CodecError::corrupt("decoded symbol count mismatch"));
    }

    Ok(output)
}
