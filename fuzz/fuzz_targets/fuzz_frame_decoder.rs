#![no_main]
use kegmeter_protocol::FrameDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The stream decoder must make forward progress on any byte soup:
    // no panics, no unbounded buffering, and decoded frames re-encode.
    let mut dec = FrameDecoder::new();
    for chunk in data.chunks(7) {
        dec.extend(chunk);
        while let Some(msg) = dec.next_message() {
            let _ = kegmeter_protocol::encode(&msg);
        }
    }
    assert!(dec.pending() <= data.len());
});
