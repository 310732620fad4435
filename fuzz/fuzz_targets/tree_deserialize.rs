//! Fuzz target for code tree deserialization
//!
//! Any tree that parses must yield a prefix-free code table and serialize
//! back to the same bytes.

#![no_main]

use huffstream_codec::HuffmanTree;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(tree) = HuffmanTree::deserialize(data) {
        assert!(tree.code_table().is_prefix_free());
        assert_eq!(tree.serialize(), data);
    }
});
