//! Conversion between a target's register file and the `g`/`G`/`p`/`P`
//! hex encoding.

use thiserror::Error;

use crate::packets::hex::{decode_hex_bytes, encode_hex, HexError};
use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDesc {
    pub name: &'static str,
    pub bitsize: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Register order and widths as GDB numbers them for one architecture.
#[derive(Debug, PartialEq, Eq)]
pub struct RegisterLayout {
    pub regs: &'static [RegisterDesc],
    pub endian: Endian,
}

impl RegisterLayout {
    pub fn hex_len(&self) -> usize {
        self.regs.iter().map(|r| r.bitsize as usize / 4).sum()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.regs.iter().position(|r| r.name == name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} hex digits, got {found}")]
    Length { expected: usize, found: usize },
    #[error("unknown register {0}")]
    UnknownRegister(usize),
    #[error(transparent)]
    Hex(#[from] HexError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet {
    layout: &'static RegisterLayout,
    values: Vec<u64>,
}

impl RegisterSet {
    pub fn new(layout: &'static RegisterLayout) -> Self {
        Self {
            layout,
            values: vec![0; layout.regs.len()],
        }
    }

    pub fn layout(&self) -> &'static RegisterLayout {
        self.layout
    }

    pub fn get(&self, regno: usize) -> Option<u64> {
        self.values.get(regno).copied()
    }

    /// Values wider than the register are truncated.
    pub fn set(&mut self, regno: usize, value: u64) {
        if let (Some(slot), Some(desc)) = (self.values.get_mut(regno), self.layout.regs.get(regno)) {
            *slot = value & mask(desc.bitsize);
        }
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.layout.hex_len());
        for regno in 0..self.values.len() {
            out.push_str(&self.encode_one(regno));
        }
        out
    }

    fn encode_one(&self, regno: usize) -> String {
        let bytes = self.layout.regs[regno].bitsize as usize / 8;
        let be = self.values[regno].to_be_bytes();
        let mut data = be[be.len() - bytes..].to_vec();
        if self.layout.endian == Endian::Little {
            data.reverse();
        }
        encode_hex(&data)
    }

    /// Replaces every value, leaving `self` untouched on error.
    pub fn decode(&mut self, hex: &str) -> Result<(), DecodeError> {
        let expected = self.layout.hex_len();
        if hex.len() != expected {
            return Err(DecodeError::Length {
                expected,
                found: hex.len(),
            });
        }
        let bytes = decode_hex_bytes(hex)?;
        let mut values = Vec::with_capacity(self.values.len());
        let mut rest = bytes.as_slice();
        for desc in self.layout.regs {
            let (chunk, tail) = rest.split_at(desc.bitsize as usize / 8);
            values.push(from_target_bytes(chunk, self.layout.endian));
            rest = tail;
        }
        self.values = values;
        Ok(())
    }

    fn decode_one(&mut self, regno: usize, hex: &str) -> Result<(), DecodeError> {
        let desc = self
            .layout
            .regs
            .get(regno)
            .ok_or(DecodeError::UnknownRegister(regno))?;
        let expected = desc.bitsize as usize / 4;
        if hex.len() != expected {
            return Err(DecodeError::Length {
                expected,
                found: hex.len(),
            });
        }
        let bytes = decode_hex_bytes(hex)?;
        self.values[regno] = from_target_bytes(&bytes, self.layout.endian);
        Ok(())
    }
}

fn mask(bitsize: u32) -> u64 {
    if bitsize >= 64 {
        u64::MAX
    } else {
        (1u64 << bitsize) - 1
    }
}

fn from_target_bytes(chunk: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| acc << 8 | *b as u64;
    match endian {
        Endian::Big => chunk.iter().fold(0, fold),
        Endian::Little => chunk.iter().rev().fold(0, fold),
    }
}

pub fn read_all<T: Target>(target: &T) -> RegisterSet {
    let mut regs = RegisterSet::new(target.register_layout());
    target.read_registers(&mut regs);
    regs
}

/// Decodes a `G` payload and hands it to the target only if all of it is valid.
pub fn write_all<T: Target>(target: &mut T, hex: &str) -> Result<(), DecodeError> {
    let mut regs = RegisterSet::new(target.register_layout());
    regs.decode(hex)?;
    log::debug!("writing {} registers", regs.values.len());
    target.write_registers(&regs);
    Ok(())
}

pub fn read_one<T: Target>(target: &T, regno: usize) -> Result<String, DecodeError> {
    let regs = read_all(target);
    if regno >= regs.values.len() {
        return Err(DecodeError::UnknownRegister(regno));
    }
    Ok(regs.encode_one(regno))
}

pub fn write_one<T: Target>(target: &mut T, regno: usize, hex: &str) -> Result<(), DecodeError> {
    let mut regs = read_all(target);
    regs.decode_one(regno, hex)?;
    target.write_registers(&regs);
    Ok(())
}
