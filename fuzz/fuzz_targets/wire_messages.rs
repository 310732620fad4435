//! Fuzz target for transfer headers and control messages

#![no_main]

use huffstream_core::{ControlRequest, ControlResponse, TransferHeader, control};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = TransferHeader::parse(data) {
        // a real header line never contains the delimiter
        let Ok(encoded) = header.encode() else {
            return;
        };
        let reparsed = TransferHeader::parse(&encoded[..encoded.len() - 1]).unwrap();
        assert_eq!(reparsed, header);
    }

    let _ = control::decode_line::<ControlRequest>(data);
    let _ = control::decode_line::<ControlResponse>(data);
});
