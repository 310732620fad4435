//! Byte frequency analysis.

/// Occurrence counts for each byte value, plus the order in which distinct
/// symbols were first seen.
///
/// The first-seen order is the tie-break used by tree construction, so two
/// tables built from the same bytes always yield the same tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: [u64; 256],
    first_seen: Vec<u8>,
}

impl FrequencyTable {
    /// Count every byte in `data`
    #[must_use]
    pub fn build(data: &[u8]) -> Self {
        let mut counts = [0u64; 256];
        let mut first_seen = Vec::new();

        for &byte in data {
            let slot = &mut counts[byte as usize];
            if *slot == 0 {
                first_seen.push(byte);
            }
            *slot += 1;
        }

        Self { counts, first_seen }
    }

    /// Occurrences of `symbol` (0 if absent)
    #[must_use]
    pub fn count(&self, symbol: u8) -> u64 {
        self.counts[symbol as usize]
    }

    /// Number of distinct symbols present
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.first_seen.len()
    }

    /// Total number of bytes counted
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// True when built from empty input
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }

    /// `(symbol, count)` pairs in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        self.first_seen
            .iter()
            .map(move |&symbol| (symbol, self.counts[symbol as usize]))
    }
}
