//! Wire-format tests: command parsing, resynchronization, and the
//! forward-progress guarantee of the stream decoder.

use kegmeter_protocol::{
    encode, FrameDecoder, Message, Routine, StatusFields, MAX_FRAME_LEN, MIN_FRAME_LEN,
};
use rstest::rstest;

fn decode_all(bytes: &[u8]) -> Vec<Message> {
    let mut dec = FrameDecoder::new();
    dec.extend(bytes);
    let mut out = Vec::new();
    while let Some(msg) = dec.next_message() {
        out.push(msg);
    }
    out
}

#[rstest]
#[case(b"[01 P 0.50]", Message::SetPercent { meter: 1, percent: 0.5 })]
#[case(b"[00 P 0.00]", Message::SetPercent { meter: 0, percent: 0.0 })]
#[case(b"[12 M 0.75]", Message::Measurement { meter: 12, percent: 0.75 })]
#[case(b"[03 R O]", Message::SetRoutine { meter: 3, routine: Routine::Off })]
#[case(b"[03 R C]", Message::SetRoutine { meter: 3, routine: Routine::Calibrating })]
#[case(b"[03 R F]", Message::SetRoutine { meter: 3, routine: Routine::Filling })]
#[case(b"[03 R M]", Message::SetRoutine { meter: 3, routine: Routine::Measuring })]
#[case(b"[03 R E]", Message::SetRoutine { meter: 3, routine: Routine::BecameEmpty })]
#[case(b"[07 C E]", Message::CalibrateEmpty { meter: 7 })]
#[case(b"[07 C N 019.50]", Message::CalibrateNonEmpty { meter: 7, known_mass_kg: 19.5 })]
#[case(b"[99 X 0]", Message::Reset { meter: 99 })]
fn parses_single_frames(#[case] bytes: &[u8], #[case] expected: Message) {
    assert_eq!(decode_all(bytes), vec![expected]);
}

#[test]
fn encode_decode_round_trip() {
    let messages = vec![
        Message::SetPercent {
            meter: 4,
            percent: 0.25,
        },
        Message::Measurement {
            meter: 0,
            percent: 1.0,
        },
        Message::CalibrateNonEmpty {
            meter: 2,
            known_mass_kg: 19.5,
        },
        Message::Status {
            meter: 1,
            fields: StatusFields {
                percent: Some(0.75),
                full_mass_kg: Some(20.0),
                empty_mass_kg: Some(4.0),
                load_kg: Some(12.34),
                variance: Some(0.01234),
            },
        },
    ];
    let mut wire = Vec::new();
    for msg in &messages {
        wire.extend(encode(msg));
    }
    assert_eq!(decode_all(&wire), messages);
}

#[test]
fn status_frame_wire_shape() {
    let frame = encode(&Message::Status {
        meter: 1,
        fields: StatusFields {
            percent: Some(0.75),
            full_mass_kg: Some(20.0),
            empty_mass_kg: Some(4.0),
            load_kg: Some(12.34),
            variance: Some(0.01234),
        },
    });
    assert_eq!(
        frame,
        b"[01 {P:0.75,F:020.00,E:004.00,L:012.34,V:0.01234}]"
    );
}

#[test]
fn resynchronizes_after_garbage() {
    let mut wire = Vec::new();
    wire.extend_from_slice(b"\x00\xffnoise]]");
    wire.extend(encode(&Message::Reset { meter: 5 }));
    wire.extend_from_slice(b"[junk in the middle");
    wire.extend(encode(&Message::SetPercent {
        meter: 6,
        percent: 0.5,
    }));
    assert_eq!(
        decode_all(&wire),
        vec![
            Message::Reset { meter: 5 },
            Message::SetPercent {
                meter: 6,
                percent: 0.5
            }
        ]
    );
}

#[test]
fn partial_frame_completes_across_reads() {
    let frame = encode(&Message::Measurement {
        meter: 2,
        percent: 0.33,
    });
    let (head, tail) = frame.split_at(5);

    let mut dec = FrameDecoder::new();
    dec.extend(head);
    assert_eq!(dec.next_message(), None);
    assert!(dec.pending() > 0, "partial frame must be kept");

    dec.extend(tail);
    assert_eq!(
        dec.next_message(),
        Some(Message::Measurement {
            meter: 2,
            percent: 0.33
        })
    );
}

#[test]
fn unclosable_frame_cannot_grow_the_buffer() {
    // A host that opens a frame and never closes it must not pin memory:
    // once the candidate is longer than any valid frame it gets discarded.
    let mut dec = FrameDecoder::new();
    dec.extend(b"[");
    for _ in 0..4096 {
        dec.extend(&[b'a'; 256]);
        assert_eq!(dec.next_message(), None);
        assert!(
            dec.pending() <= MAX_FRAME_LEN,
            "buffered {} bytes of an unclosable frame",
            dec.pending()
        );
    }

    // And the decoder still resynchronizes onto the next good frame.
    dec.extend(b"[02 X 0]");
    assert_eq!(dec.next_message(), Some(Message::Reset { meter: 2 }));
}

#[test]
fn malformed_candidate_costs_one_byte() {
    // The inner "[02 X 0]" only becomes visible after the outer malformed
    // candidate is shifted past one byte at a time.
    let wire = b"[xx [02 X 0]";
    assert_eq!(decode_all(wire), vec![Message::Reset { meter: 2 }]);
}

#[test]
fn short_candidate_is_rejected() {
    assert!(decode_all(b"[01 ]").is_empty());
    assert!(b"[01 ]".len() < MIN_FRAME_LEN);
}

#[test]
fn unknown_command_and_routine_are_dropped() {
    assert!(decode_all(b"[01 Q 0.50]").is_empty());
    assert!(decode_all(b"[01 R Z]").is_empty());
    assert!(decode_all(b"[01 C Q]").is_empty());
}

#[test]
fn unknown_status_key_is_dropped() {
    assert!(decode_all(b"[01 {Z:1.00}]").is_empty());
    // Known keys next to each other still parse.
    assert_eq!(
        decode_all(b"[01 {P:0.50,L:004.00}]").as_slice(),
        &[Message::Status {
            meter: 1,
            fields: StatusFields {
                percent: Some(0.5),
                load_kg: Some(4.0),
                ..Default::default()
            }
        }]
    );
}

#[test]
fn garbage_without_frame_start_is_discarded() {
    let mut dec = FrameDecoder::new();
    dec.extend(b"no delimiters here at all");
    assert_eq!(dec.next_message(), None);
    assert_eq!(dec.pending(), 0);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary byte soup never panics, never loops forever, and the
        /// buffered remainder stays bounded by the input size.
        #[test]
        fn decoder_makes_forward_progress(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64), 0..16,
        )) {
            let mut dec = FrameDecoder::new();
            let mut total = 0usize;
            for chunk in &chunks {
                total += chunk.len();
                dec.extend(chunk);
                while dec.next_message().is_some() {}
                prop_assert!(dec.pending() <= total);
            }
        }

        /// A valid frame embedded in arbitrary prefix noise still decodes,
        /// as long as the noise cannot form a frame of its own.
        #[test]
        fn frame_survives_non_delimiter_prefix(
            prefix in proptest::collection::vec(
                any::<u8>().prop_filter("no delimiters", |b| *b != b'[' && *b != b']'),
                0..32,
            ),
            meter in 0usize..100,
        ) {
            let mut wire = prefix;
            wire.extend(encode(&Message::Reset { meter }));
            prop_assert_eq!(decode_all(&wire), vec![Message::Reset { meter }]);
        }
    }
}
