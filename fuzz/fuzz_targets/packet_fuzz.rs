//! Fuzz target for the packet decoder.
//!
//! Arbitrary bytes must decode to packets or a `WireError`, never panic.
//! Whatever decodes must encode and decode back to the same packets.
//!
//! Run with: cargo +nightly fuzz run packet_fuzz -- -max_total_time=60

#![no_main]

use hpcview_wire::{encode_packet, PacketDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let decoder = PacketDecoder::well_known();
    let Ok(packets) = decoder.decode_buffer(data) else {
        return;
    };

    let mut bytes = Vec::new();
    for packet in &packets {
        bytes.extend(encode_packet(packet).expect("decoded packet must re-encode"));
    }
    let again = decoder
        .decode_buffer(&bytes)
        .expect("re-encoded packets must decode");
    assert_eq!(packets, again);
});
