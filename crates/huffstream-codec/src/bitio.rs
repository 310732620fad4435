//! MSB-first bit packing.
//!
//! `BitWriter` accumulates bits into bytes and reports how many zero bits
//! were appended to reach the final byte boundary. `BitReader` reads back a
//! bounded number of bits so that padding is never mistaken for data.

/// Writes bits MSB-first into a byte buffer.
///
/// # Invariants
/// - `pending` holds at most 7 bits, left-aligned
/// - `pending_len` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    pending: u8,
    pending_len: u8,
}

impl BitWriter {
    /// Create an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `bytes` output bytes
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            pending: 0,
            pending_len: 0,
        }
    }

    /// Append a single bit
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.pending |= 0x80 >> self.pending_len;
        }
        self.pending_len += 1;

        if self.pending_len == 8 {
            self.bytes.push(self.pending);
            self.pending = 0;
            self.pending_len = 0;
        }
    }

    /// Append the lowest `count` bits of `value`, most significant first
    ///
    /// # Panics
    /// Panics in debug builds if `count > 64`.
    pub fn write_bits(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 64, "cannot write more than 64 bits at once");

        let mut remaining = count;
        while remaining > 0 {
            let free = u32::from(8 - self.pending_len);
            let take = remaining.min(free);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;

            self.pending |= chunk << (free - take);
            self.pending_len += take as u8;
            remaining -= take;

            if self.pending_len == 8 {
                self.bytes.push(self.pending);
                self.pending = 0;
                self.pending_len = 0;
            }
        }
    }

    /// Total number of bits written so far
    #[must_use]
    pub fn bit_len(&self) -> u64 {
        self.bytes.len() as u64 * 8 + u64::from(self.pending_len)
    }

    /// Flush the partial byte and return `(bytes, padding_bits)`
    ///
    /// The final byte is completed with zero bits; `padding_bits` is how many
    /// were added (0-7).
    #[must_use]
    pub fn finish(mut self) -> (Vec<u8>, u8) {
        if self.pending_len == 0 {
            return (self.bytes, 0);
        }

        let padding = 8 - self.pending_len;
        self.bytes.push(self.pending);
        (self.bytes, padding)
    }
}

/// Reads bits MSB-first from a byte slice, up to a fixed bit limit.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: u64,
    limit: u64,
}

impl<'a> BitReader<'a> {
    /// Read every bit in `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            limit: data.len() as u64 * 8,
        }
    }

    /// Read only the first `bit_len` bits of `data`
    ///
    /// `bit_len` is clamped to the number of bits actually present.
    #[must_use]
    pub fn with_limit(data: &'a [u8], bit_len: u64) -> Self {
        Self {
            data,
            position: 0,
            limit: bit_len.min(data.len() as u64 * 8),
        }
    }

    /// Read one bit, or `None` once the limit is reached
    pub fn read_bit(&mut self) -> Option<bool> {
        if self.position >= self.limit {
            return None;
        }

        let byte = self.data[(self.position / 8) as usize];
        let bit = byte & (0x80 >> (self.position % 8)) != 0;
        self.position += 1;
        Some(bit)
    }

    /// Read `count` bits (at most 64) as an integer, MSB first
    ///
    /// Returns `None` without consuming anything if fewer than `count` bits
    /// remain.
    pub fn read_bits(&mut self, count: u32) -> Option<u64> {
        if count > 64 || u64::from(count) > self.remaining() {
            return None;
        }

        let mut value = 0u64;
        for _ in 0..count {
            let bit = self.read_bit()?;
            value = (value << 1) | u64::from(bit);
        }
        Some(value)
    }

    /// Bits left before the limit
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit - self.position
    }

    /// Current bit offset from the start of the slice
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True once every bit up to the limit has been read
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.limit
    }
}
