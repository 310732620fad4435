//! Huffman tree construction, code derivation and tree serialization.
//!
//! Nodes live in an arena and refer to their children by index. Leaves are
//! appended in first-seen symbol order and every merged node is appended
//! after them, so the arena index doubles as the insertion sequence number.
//! The merge queue orders candidates by `(weight, index)`, which makes the
//! tree shape a pure function of the frequency table.
//!
//! # Serialized Form
//!
//! ```text
//! pre-order, MSB-first bits:
//!   0          internal node, left subtree then right subtree follow
//!   1 <8 bits> leaf carrying a symbol
//! ```
//!
//! The last byte is completed with zero bits. An empty tree serializes to
//! zero bytes.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::frequency::FrequencyTable;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

/// Longest possible code: a fully skewed tree over 256 symbols
pub const MAX_CODE_LEN: usize = 255;

const CODE_WORDS: usize = 4;

/// A prefix code: up to [`MAX_CODE_LEN`] bits, MSB-first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    words: [u64; CODE_WORDS],
    len: u8,
}

impl Code {
    const EMPTY: Code = Code {
        words: [0; CODE_WORDS],
        len: 0,
    };

    /// Build a code from explicit bits
    ///
    /// Returns `None` if more than [`MAX_CODE_LEN`] bits are given.
    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Option<Self> {
        if bits.len() > MAX_CODE_LEN {
            return None;
        }
        Some(bits.iter().fold(Self::EMPTY, |code, &bit| code.with_bit(bit)))
    }

    fn with_bit(mut self, bit: bool) -> Self {
        let index = self.len as usize;
        if bit {
            self.words[index / 64] |= 1u64 << (63 - index % 64);
        }
        self.len += 1;
        self
    }

    /// Number of bits
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for the zero-length code (never produced by a built tree)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at `index` (0 = first bit emitted)
    #[must_use]
    pub fn bit(&self, index: usize) -> bool {
        debug_assert!(index < self.len());
        self.words[index / 64] & (1u64 << (63 - index % 64)) != 0
    }

    /// Bits in emission order
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(move |index| self.bit(index))
    }

    /// True if `self` is a (non-strict) prefix of `other`
    #[must_use]
    pub fn is_prefix_of(&self, other: &Code) -> bool {
        self.len <= other.len && (0..self.len()).all(|index| self.bit(index) == other.bit(index))
    }

    pub(crate) fn write_to(&self, writer: &mut BitWriter) {
        let mut remaining = self.len();
        for word in self.words {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(64);
            writer.write_bits(word >> (64 - take), take as u32);
            remaining -= take;
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

/// Symbol to code mapping derived from a tree
#[derive(Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: Vec<Option<Code>>,
    symbols: usize,
}

impl CodeTable {
    fn new() -> Self {
        Self {
            codes: vec![None; 256],
            symbols: 0,
        }
    }

    fn insert(&mut self, symbol: u8, code: Code) {
        if self.codes[symbol as usize].replace(code).is_none() {
            self.symbols += 1;
        }
    }

    /// Code assigned to `symbol`, if it is part of the alphabet
    #[must_use]
    pub fn get(&self, symbol: u8) -> Option<&Code> {
        self.codes[symbol as usize].as_ref()
    }

    /// Number of symbols with a code
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols
    }

    /// True when no symbol has a code
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols == 0
    }

    /// `(symbol, code)` pairs in ascending symbol order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Code)> + '_ {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(symbol, code)| code.as_ref().map(|code| (symbol as u8, code)))
    }

    /// True if no code is a prefix of another and every code is non-empty
    #[must_use]
    pub fn is_prefix_free(&self) -> bool {
        let codes: Vec<&Code> = self.iter().map(|(_, code)| code).collect();
        codes.iter().all(|code| !code.is_empty())
            && codes.iter().enumerate().all(|(i, a)| {
                codes
                    .iter()
                    .enumerate()
                    .all(|(j, b)| i == j || !a.is_prefix_of(b))
            })
    }

    /// Encoded length in bits of the data summarized by `frequencies`
    #[must_use]
    pub fn encoded_bits(&self, frequencies: &FrequencyTable) -> u64 {
        frequencies
            .iter()
            .map(|(symbol, count)| count * self.get(symbol).map_or(0, |code| code.len() as u64))
            .sum()
    }
}

impl fmt::Debug for CodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(symbol, code)| (symbol, code.to_string())))
            .finish()
    }
}

/// Arena node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Terminal node carrying a symbol
    Leaf {
        /// Byte value
        symbol: u8,
        /// Occurrence count (0 for trees read from a container)
        weight: u64,
    },
    /// Branch with exactly two children
    Internal {
        /// Arena index of the `0` child
        left: usize,
        /// Arena index of the `1` child
        right: usize,
        /// Sum of the children's weights
        weight: u64,
    },
}

impl Node {
    /// Node weight
    #[must_use]
    pub fn weight(&self) -> u64 {
        match *self {
            Node::Leaf { weight, .. } | Node::Internal { weight, .. } => weight,
        }
    }
}

/// A Huffman tree and its derived code table
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    codes: CodeTable,
}

impl HuffmanTree {
    /// Build a tree by greedy minimum-weight merging
    ///
    /// Ties are broken by insertion sequence (leaves in first-seen order,
    /// then merged nodes in creation order), never by symbol value.
    #[must_use]
    pub fn build(frequencies: &FrequencyTable) -> Self {
        let mut nodes = Vec::with_capacity(frequencies.distinct() * 2);
        let mut queue = BinaryHeap::with_capacity(frequencies.distinct());

        for (symbol, weight) in frequencies.iter() {
            queue.push(Reverse((weight, nodes.len())));
            nodes.push(Node::Leaf { symbol, weight });
        }

        let root = loop {
            let Some(Reverse((left_weight, left))) = queue.pop() else {
                break None;
            };
            let Some(Reverse((right_weight, right))) = queue.pop() else {
                break Some(left);
            };

            let weight = left_weight + right_weight;
            queue.push(Reverse((weight, nodes.len())));
            nodes.push(Node::Internal {
                left,
                right,
                weight,
            });
        };

        let tree = Self::from_arena(nodes, root);
        tracing::trace!(
            symbols = tree.codes.len(),
            nodes = tree.nodes.len(),
            "built huffman tree"
        );
        tree
    }

    fn from_arena(nodes: Vec<Node>, root: Option<usize>) -> Self {
        let mut codes = CodeTable::new();

        if let Some(root) = root {
            match nodes[root] {
                // A lone symbol gets the reserved one-bit code `0`
                Node::Leaf { symbol, .. } => codes.insert(symbol, Code::EMPTY.with_bit(false)),
                Node::Internal { .. } => {
                    let mut stack = vec![(root, Code::EMPTY)];
                    while let Some((index, code)) = stack.pop() {
                        match nodes[index] {
                            Node::Leaf { symbol, .. } => codes.insert(symbol, code),
                            Node::Internal { left, right, .. } => {
                                stack.push((right, code.with_bit(true)));
                                stack.push((left, code.with_bit(false)));
                            }
                        }
                    }
                }
            }
        }

        Self { nodes, root, codes }
    }

    /// Root index, `None` for the empty tree
    #[must_use]
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Node at arena `index`
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Number of arena nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when built from empty input
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Derived code table
    #[must_use]
    pub fn code_table(&self) -> &CodeTable {
        &self.codes
    }

    /// Serialize the tree shape and symbols
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let Some(root) = self.root else {
            return Vec::new();
        };

        let mut writer = BitWriter::with_capacity(self.nodes.len() * 2);
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            match self.nodes[index] {
                Node::Leaf { symbol, .. } => {
                    writer.write_bit(true);
                    writer.write_bits(u64::from(symbol), 8);
                }
                Node::Internal { left, right, .. } => {
                    writer.write_bit(false);
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        writer.finish().0
    }

    /// Rebuild a tree from [`HuffmanTree::serialize`] output
    ///
    /// # Errors
    /// Returns `MalformedContainer` if the bytes are truncated, repeat a
    /// symbol, nest deeper than [`MAX_CODE_LEN`], or carry trailing data.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::from_arena(Vec::new(), None));
        }

        let mut reader = BitReader::new(bytes);
        let mut nodes = Vec::new();
        let mut seen = [false; 256];
        let root = parse_node(&mut reader, &mut nodes, &mut seen, 0)?;

        if reader.remaining() >= 8 {
            return Err(CodecError::malformed("trailing bytes after code tree"));
        }
        while let Some(bit) = reader.read_bit() {
            if bit {
                return Err(CodecError::malformed("non-zero padding after code tree"));
            }
        }

        Ok(Self::from_arena(nodes, Some(root)))
    }
}

fn parse_node(
    reader: &mut BitReader<'_>,
    nodes: &mut Vec<Node>,
    seen: &mut [bool; 256],
    depth: usize,
) -> Result<usize> {
    if depth > MAX_CODE_LEN {
        return Err(CodecError::malformed("code tree too deep"));
    }

    let is_leaf = reader
        .read_bit()
        .ok_or(CodecError::malformed("truncated code tree"))?;

    let node = if is_leaf {
        let symbol = reader
            .read_bits(8)
            .ok_or(CodecError::malformed("truncated leaf symbol"))? as u8;
        if std::mem::replace(&mut seen[symbol as usize], true) {
            return Err(CodecError::malformed("duplicate symbol in code tree"));
        }
        Node::Leaf { symbol, weight: 0 }
    } else {
        let left = parse_node(reader, nodes, seen, depth + 1)?;
        let right = parse_node(reader, nodes, seen, depth + 1)?;
        Node::Internal {
            left,
            right,
            weight: 0,
        }
    };

    nodes.push(node);
    Ok(nodes.len() - 1)
}
