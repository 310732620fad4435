//! Error types for the HuffStream codec.

use std::borrow::Cow;
use thiserror::Error;

/// Codec and container errors
///
/// All variants are fatal for the operation that produced them: a corrupt
/// payload or malformed container is never recovered locally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bit stream does not resolve to the expected symbols
    #[error("corrupt payload: {0}")]
    CorruptPayload(Cow<'static, str>),

    /// Container metadata failed validation
    #[error("malformed container: {0}")]
    MalformedContainer(Cow<'static, str>),

    /// Input byte has no code in the tree used for encoding
    #[error("symbol 0x{0:02x} has no code in the tree")]
    UnknownSymbol(u8),
}

impl CodecError {
    /// Create a corrupt payload error with static context (zero allocation)
    #[must_use]
    pub const fn corrupt(context: &'static str) -> Self {
        CodecError::CorruptPayload(Cow::Borrowed(context))
    }

    /// Create a malformed container error with static context (zero allocation)
    #[must_use]
    pub const fn malformed(context: &'static str) -> Self {
        CodecError::MalformedContainer(Cow::Borrowed(context))
    }

    /// Returns true for errors raised while parsing container metadata
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::MalformedContainer(_))
    }

    /// Returns true for errors raised while decoding the payload bits
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CodecError::CorruptPayload(_))
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::corrupt("stream ended mid-code");
        assert_eq!(err.to_string(), "corrupt payload: stream ended mid-code");

        let err = CodecError::MalformedContainer(Cow::Owned(format!("padding {}", 9)));
        assert_eq!(err.to_string(), "malformed container: padding 9");
    }

    #[test]
    fn test_error_classification() {
        assert!(CodecError::corrupt("x").is_corrupt());
        assert!(!CodecError::corrupt("x").is_malformed());
        assert!(CodecError::malformed("x").is_malformed());
        assert!(!CodecError::malformed("x").is_corrupt());
        assert!(!CodecError::UnknownSymbol(0x41).is_corrupt());
        assert_eq!(
            CodecError::UnknownSymbol(0x41).to_string(),
            "symbol 0x41 has no code in the tree"
        );
    }
}
