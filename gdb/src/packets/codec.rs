//! RSP framing: `$<payload>#<checksum>` plus the single byte control frames.
//!
//! Nothing in here keeps state between calls, the session owns the buffers.

use thiserror::Error;

pub const ACK: u8 = b'+';
pub const NACK: u8 = b'-';
pub const INTERRUPT: u8 = 0x03;
pub const START: u8 = b'$';
pub const END: u8 = b'#';
pub const ESCAPE: u8 = b'}';

const ESCAPE_XOR: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ack,
    Nack,
    Interrupt,
    Packet(Packet),
    /// Only noise was found, it has been consumed.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub frame: Frame,
    /// Bytes of the input used up by this frame, including skipped noise.
    pub consumed: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("incomplete frame")]
    NeedMoreData,
    #[error("checksum mismatch: received {received:?}, computed {computed:#04x}")]
    Checksum {
        received: Option<u8>,
        computed: u8,
        consumed: usize,
    },
    #[error("escape byte at end of payload")]
    DanglingEscape { consumed: usize },
}

impl CodecError {
    /// Bytes to drop before decoding again, zero when more input is needed.
    pub fn consumed(&self) -> usize {
        match self {
            CodecError::NeedMoreData => 0,
            CodecError::Checksum { consumed, .. } | CodecError::DanglingEscape { consumed } => {
                *consumed
            }
        }
    }
}

pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

fn hex_value(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Decodes the first frame in `buf`.
///
/// A `+` directly in front of `$` is the ack of the previous reply and is
/// swallowed. Bytes that cannot start a frame are skipped, and a `$` inside
/// an unfinished body restarts the frame there.
pub fn decode(buf: &[u8]) -> Result<Decoded, CodecError> {
    if buf.is_empty() {
        return Err(CodecError::NeedMoreData);
    }

    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            ACK if buf.get(i + 1) == Some(&START) => i += 1,
            ACK => {
                return Ok(Decoded {
                    frame: Frame::Ack,
                    consumed: i + 1,
                })
            }
            NACK => {
                return Ok(Decoded {
                    frame: Frame::Nack,
                    consumed: i + 1,
                })
            }
            INTERRUPT => {
                return Ok(Decoded {
                    frame: Frame::Interrupt,
                    consumed: i + 1,
                })
            }
            START => match decode_packet(buf, i) {
                Body::Resync(next) => i = next,
                Body::Done(res) => return res,
            },
            other => {
                log::trace!("skipping noise byte {:#04x}", other);
                i += 1;
            }
        }
    }

    Ok(Decoded {
        frame: Frame::Discarded,
        consumed: buf.len(),
    })
}

enum Body {
    Resync(usize),
    Done(Result<Decoded, CodecError>),
}

fn decode_packet(buf: &[u8], start: usize) -> Body {
    let body_start = start + 1;
    let mut end = None;
    for (off, &b) in buf[body_start..].iter().enumerate() {
        match b {
            START => return Body::Resync(body_start + off),
            END => {
                end = Some(body_start + off);
                break;
            }
            _ => {}
        }
    }
    let Some(end) = end else {
        return Body::Done(Err(CodecError::NeedMoreData));
    };
    if buf.len() < end + 3 {
        return Body::Done(Err(CodecError::NeedMoreData));
    }

    let consumed = end + 3;
    let raw = &buf[body_start..end];
    let computed = checksum(raw);
    let received = match (hex_value(buf[end + 1]), hex_value(buf[end + 2])) {
        (Some(hi), Some(lo)) => Some(hi << 4 | lo),
        _ => None,
    };
    if received != Some(computed) {
        return Body::Done(Err(CodecError::Checksum {
            received,
            computed,
            consumed,
        }));
    }

    let mut payload = Vec::with_capacity(raw.len());
    let mut iter = raw.iter();
    while let Some(&b) = iter.next() {
        if b == ESCAPE {
            match iter.next() {
                Some(&escaped) => payload.push(escaped ^ ESCAPE_XOR),
                None => return Body::Done(Err(CodecError::DanglingEscape { consumed })),
            }
        } else {
            payload.push(b);
        }
    }

    Body::Done(Ok(Decoded {
        frame: Frame::Packet(Packet { payload }),
        consumed,
    }))
}

fn needs_escape(b: u8) -> bool {
    matches!(b, START | END | ESCAPE | b'*')
}

/// `$<escaped payload>#<checksum>` without the leading ack, used for
/// retransmissions and for replies that do not answer a packet.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(START);
    for &b in payload {
        if needs_escape(b) {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    let sum = checksum(&out[1..]);
    out.push(END);
    out.extend_from_slice(format!("{:02x}", sum).as_bytes());
    out
}

/// A reply to a received packet: the ack followed by the framed payload.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![ACK];
    out.extend(frame(payload));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(payload: &[u8]) -> Frame {
        Frame::Packet(Packet {
            payload: payload.to_vec(),
        })
    }

    #[test]
    fn known_checksums() {
        assert_eq!(encode(b"OK"), b"+$OK#9a");
        assert_eq!(encode(b""), b"+$#00");
        assert_eq!(frame(b"S05"), b"$S05#b8");
        assert_eq!(checksum(b"?"), 0x3f);
    }

    #[test]
    fn decodes_control_bytes() {
        assert_eq!(decode(b"+").unwrap().frame, Frame::Ack);
        assert_eq!(decode(b"-").unwrap().frame, Frame::Nack);
        assert_eq!(decode(&[INTERRUPT]).unwrap().frame, Frame::Interrupt);
        assert_eq!(decode(b"").unwrap_err(), CodecError::NeedMoreData);
    }

    #[test]
    fn leading_ack_is_swallowed() {
        let decoded = decode(b"+$g#67").unwrap();
        assert_eq!(decoded.frame, packet(b"g"));
        assert_eq!(decoded.consumed, 6);
    }

    #[test]
    fn noise_and_restarts_are_skipped() {
        let decoded = decode(b"xx$qSup$?#3f").unwrap();
        assert_eq!(decoded.frame, packet(b"?"));
        assert_eq!(decoded.consumed, 12);

        let decoded = decode(b"garbage").unwrap();
        assert_eq!(decoded.frame, Frame::Discarded);
        assert_eq!(decoded.consumed, 7);
    }

    #[test]
    fn partial_frames_need_more_data() {
        assert_eq!(decode(b"$g").unwrap_err(), CodecError::NeedMoreData);
        assert_eq!(decode(b"$g#6").unwrap_err(), CodecError::NeedMoreData);
    }

    #[test]
    fn any_flipped_checksum_bit_is_rejected() {
        for bit in 0..8 {
            let bad = format!("$?#{:02x}", 0x3fu8 ^ (1 << bit));
            match decode(bad.as_bytes()) {
                Err(CodecError::Checksum {
                    computed, consumed, ..
                }) => {
                    assert_eq!(computed, 0x3f);
                    assert_eq!(consumed, 5);
                }
                other => panic!("bit {}: {:?}", bit, other),
            }
        }
        assert!(matches!(
            decode(b"$?#zz"),
            Err(CodecError::Checksum { received: None, .. })
        ));
    }

    #[test]
    fn escaped_bytes_survive() {
        let payloads: [&[u8]; 5] = [b"", b"$", b"a#b}c*d", &[0x7d, 0x7d, 0x23], &[0, 0xff, 0x24]];
        for payload in payloads {
            let wire = encode(payload);
            assert!(!wire[2..wire.len() - 3].contains(&b'#'));
            let decoded = decode(&wire).unwrap();
            assert_eq!(decoded.frame, packet(payload));
            assert_eq!(decoded.consumed, wire.len());
        }
    }

    #[test]
    fn every_byte_value_survives() {
        let payload: Vec<u8> = (0..=255).collect();
        let decoded = decode(&encode(&payload)).unwrap();
        assert_eq!(decoded.frame, packet(&payload));
    }

    #[test]
    fn dangling_escape_is_an_error() {
        let sum = checksum(b"a}");
        let wire = format!("$a}}#{:02x}", sum);
        assert_eq!(
            decode(wire.as_bytes()).unwrap_err(),
            CodecError::DanglingEscape { consumed: 6 }
        );
    }
}
