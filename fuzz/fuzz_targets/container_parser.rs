//! Fuzz target for container parsing
//!
//! Arbitrary bytes must never panic the parser or the decoder, and a
//! container that does decode must reproduce its declared length.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(container) = huffstream_codec::unpack(data) {
        if let Ok(decoded) = container.decode() {
            assert_eq!(decoded.len() as u64, container.original_len());
        }
    }
});
