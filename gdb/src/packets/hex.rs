use num_traits::Num;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("empty hex field")]
    Empty,
    #[error("invalid hex field {0:?}")]
    Invalid(String),
    #[error("odd number of hex digits")]
    OddLength,
}

/// Parses a bare hex field (no prefix, no sign) into any integer type.
pub fn parse_hex<T: Num>(field: &str) -> Result<T, HexError> {
    if field.is_empty() {
        return Err(HexError::Empty);
    }
    if !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HexError::Invalid(field.into()));
    }
    T::from_str_radix(field, 16).map_err(|_| HexError::Invalid(field.into()))
}

fn digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub fn decode_hex_bytes(data: &str) -> Result<Vec<u8>, HexError> {
    let data = data.as_bytes();
    if data.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    data.chunks_exact(2)
        .map(|pair| match (digit(pair[0]), digit(pair[1])) {
            (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
            _ => Err(HexError::Invalid(String::from_utf8_lossy(pair).into_owned())),
        })
        .collect()
}

/// Lowercase hex, two digits per byte.
pub fn push_hex(out: &mut String, byte: u8) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    out.push(DIGITS[(byte >> 4) as usize] as char);
    out.push(DIGITS[(byte & 0x0f) as usize] as char);
}

pub fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &b in data {
        push_hex(&mut out, b);
    }
    out
}
