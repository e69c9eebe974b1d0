#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Line-framed ASCII protocol between the meter node and the host.
//!
//! A frame is `[<index:2 digits> <payload>]`. Command payloads carry a
//! single command character plus data; status payloads are brace-wrapped
//! `key:value` pairs with single-character keys. Numeric fields are
//! zero-padded at fixed precision so frame lengths stay predictable for
//! small receive buffers.
//!
//! The decoder works over an append-only byte buffer: garbage is skipped
//! byte-by-byte, partial frames are kept until more bytes arrive (up to a
//! fixed length cap), and a malformed candidate costs exactly one discarded
//! byte, so the parser can never stall on corrupt input or buffer it
//! without bound.

mod codec;
mod message;

pub use codec::{FrameDecoder, MAX_FRAME_LEN, MIN_FRAME_LEN, encode};
pub use message::{Message, Routine, StatusFields};

use thiserror::Error;

/// Why a candidate frame body failed to parse. Never escapes the codec as
/// a stream failure; it only explains a single discarded byte.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than minimum")]
    TooShort,
    #[error("meter index is not two digits")]
    BadIndex,
    #[error("missing separator after meter index")]
    BadSeparator,
    #[error("unknown command character {0:?}")]
    UnknownCommand(char),
    #[error("unknown status key {0:?}")]
    UnknownKey(char),
    #[error("unknown routine tag {0:?}")]
    BadRoutine(char),
    #[error("numeric field did not parse")]
    BadNumber,
    #[error("payload ended early")]
    Truncated,
}
