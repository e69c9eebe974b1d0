//! Frame encoding and the resynchronizing stream decoder.

use crate::message::{Message, Routine, StatusFields};
use crate::FrameError;

/// Shortest well-formed frame, brackets included (`[NN R O]`).
/// Candidates with both delimiters but fewer bytes are definitively
/// malformed and cost one discarded byte.
pub const MIN_FRAME_LEN: usize = 8;

/// Longest frame the decoder will wait on. A five-field status frame is 50
/// bytes; anything unclosed past this is garbage, not a slow frame, and is
/// discarded so a host that never sends `]` cannot grow the buffer.
pub const MAX_FRAME_LEN: usize = 64;

const FRAME_START: u8 = b'[';
const FRAME_END: u8 = b']';

fn fmt_percent(p: f64) -> String {
    // 4 characters at 2 decimals; inputs are pre-clamped to [0,1]
    format!("{:.2}", p.clamp(0.0, 1.0))
}

fn fmt_mass(kg: f64) -> String {
    format!("{:06.2}", kg)
}

/// Encode a message into one delimited frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let body = match *msg {
        Message::SetPercent { meter, percent } => {
            format!("{meter:02} P {}", fmt_percent(percent))
        }
        Message::SetRoutine { meter, routine } => {
            format!("{meter:02} R {}", routine.tag())
        }
        Message::CalibrateEmpty { meter } => format!("{meter:02} C E"),
        Message::CalibrateNonEmpty {
            meter,
            known_mass_kg,
        } => format!("{meter:02} C N {}", fmt_mass(known_mass_kg)),
        Message::Reset { meter } => format!("{meter:02} X 0"),
        Message::Measurement { meter, percent } => {
            format!("{meter:02} M {}", fmt_percent(percent))
        }
        Message::Status { meter, fields } => {
            let mut pairs: Vec<String> = Vec::with_capacity(5);
            if let Some(p) = fields.percent {
                pairs.push(format!("P:{}", fmt_percent(p)));
            }
            if let Some(f) = fields.full_mass_kg {
                pairs.push(format!("F:{}", fmt_mass(f)));
            }
            if let Some(e) = fields.empty_mass_kg {
                pairs.push(format!("E:{}", fmt_mass(e)));
            }
            if let Some(l) = fields.load_kg {
                pairs.push(format!("L:{}", fmt_mass(l)));
            }
            if let Some(v) = fields.variance {
                pairs.push(format!("V:{:.5}", v));
            }
            format!("{meter:02} {{{}}}", pairs.join(","))
        }
    };
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(FRAME_START);
    out.extend_from_slice(body.as_bytes());
    out.push(FRAME_END);
    out
}

fn parse_f64(bytes: &[u8]) -> Result<f64, FrameError> {
    let s = std::str::from_utf8(bytes).map_err(|_| FrameError::BadNumber)?;
    let v: f64 = s.parse().map_err(|_| FrameError::BadNumber)?;
    if !v.is_finite() {
        return Err(FrameError::BadNumber);
    }
    Ok(v)
}

fn parse_status_fields(inner: &[u8]) -> Result<StatusFields, FrameError> {
    let mut fields = StatusFields::default();
    if inner.is_empty() {
        return Ok(fields);
    }
    for pair in inner.split(|&b| b == b',') {
        if pair.len() < 3 || pair[1] != b':' {
            return Err(FrameError::BadSeparator);
        }
        let value = parse_f64(&pair[2..])?;
        match pair[0] {
            b'P' => fields.percent = Some(value),
            b'F' => fields.full_mass_kg = Some(value),
            b'E' => fields.empty_mass_kg = Some(value),
            b'L' => fields.load_kg = Some(value),
            b'V' => fields.variance = Some(value),
            other => return Err(FrameError::UnknownKey(other as char)),
        }
    }
    Ok(fields)
}

/// Parse a frame body (the bytes between the brackets).
fn parse_body(body: &[u8]) -> Result<Message, FrameError> {
    if body.len() < MIN_FRAME_LEN - 2 {
        return Err(FrameError::TooShort);
    }
    if !body[0].is_ascii_digit() || !body[1].is_ascii_digit() {
        return Err(FrameError::BadIndex);
    }
    let meter = ((body[0] - b'0') * 10 + (body[1] - b'0')) as usize;
    if body[2] != b' ' {
        return Err(FrameError::BadSeparator);
    }
    let rest = &body[3..];

    if rest[0] == b'{' {
        if *rest.last().ok_or(FrameError::Truncated)? != b'}' {
            return Err(FrameError::Truncated);
        }
        let fields = parse_status_fields(&rest[1..rest.len() - 1])?;
        return Ok(Message::Status { meter, fields });
    }

    // Command shape: one command character, a space, then data.
    if rest.len() < 3 {
        return Err(FrameError::Truncated);
    }
    if rest[1] != b' ' {
        return Err(FrameError::BadSeparator);
    }
    let data = &rest[2..];
    match rest[0] {
        b'P' => {
            let percent = parse_f64(data)?.clamp(0.0, 1.0);
            Ok(Message::SetPercent { meter, percent })
        }
        b'M' => {
            let percent = parse_f64(data)?.clamp(0.0, 1.0);
            Ok(Message::Measurement { meter, percent })
        }
        b'R' => {
            if data.len() != 1 {
                return Err(FrameError::Truncated);
            }
            let routine =
                Routine::from_tag(data[0] as char).ok_or(FrameError::BadRoutine(data[0] as char))?;
            Ok(Message::SetRoutine { meter, routine })
        }
        b'C' => match data[0] {
            b'E' if data.len() == 1 => Ok(Message::CalibrateEmpty { meter }),
            b'N' => {
                if data.len() < 3 || data[1] != b' ' {
                    return Err(FrameError::Truncated);
                }
                let known_mass_kg = parse_f64(&data[2..])?;
                Ok(Message::CalibrateNonEmpty {
                    meter,
                    known_mass_kg,
                })
            }
            other => Err(FrameError::UnknownCommand(other as char)),
        },
        b'X' => Ok(Message::Reset { meter }),
        other => Err(FrameError::UnknownCommand(other as char)),
    }
}

/// Streaming decoder over an append-only inbound buffer.
///
/// Feed raw reads with `extend`, then drain frames with `next_message`.
/// Bytes before a frame start are dropped; a start without an end is kept
/// for completion by a later read; a candidate that fails validation costs
/// exactly one leading byte before the scan retries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered (at most one partial frame after a drain).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if any.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let start = match self.buf.iter().position(|&b| b == FRAME_START) {
                Some(i) => i,
                None => {
                    // No frame fragment at all; nothing here can ever parse.
                    self.buf.clear();
                    return None;
                }
            };
            if start > 0 {
                self.buf.drain(..start);
            }

            let end = match self.buf.iter().skip(1).position(|&b| b == FRAME_END) {
                Some(i) => i + 1,
                None => {
                    // Partial frame: wait for the closing delimiter, unless
                    // the candidate is already too long to ever be valid.
                    if self.buf.len() > MAX_FRAME_LEN {
                        tracing::trace!(len = self.buf.len(), "oversized partial frame, resyncing");
                        self.buf.drain(..1);
                        continue;
                    }
                    return None;
                }
            };

            if end + 1 < MIN_FRAME_LEN {
                tracing::trace!(len = end + 1, "frame candidate too short, resyncing");
                self.buf.drain(..1);
                continue;
            }

            match parse_body(&self.buf[1..end]) {
                Ok(msg) => {
                    self.buf.drain(..=end);
                    return Some(msg);
                }
                Err(err) => {
                    tracing::trace!(%err, "discarding one byte after bad frame");
                    self.buf.drain(..1);
                }
            }
        }
    }
}
