use thiserror::Error;

use crate::packets::hex::decode_hex_bytes;
use crate::packets::response::ErrorCode;
use crate::target::Target;

/// Largest `m`/`M` transfer accepted in one packet.
pub const MAX_MEMORY_TRANSFER: u32 = 0x1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("zero length access at {0:#010x}")]
    ZeroLength(u32),
    #[error("{addr:#010x} + {len:#x} overflows the address space")]
    Overflow { addr: u32, len: u32 },
    #[error("{addr:#010x}..+{len:#x} is not backed by target memory")]
    OutOfRange { addr: u32, len: u32 },
    #[error("transfer of {0:#x} bytes is too long")]
    TooLong(u32),
    #[error("expected {expected} hex digits of data, got {found}")]
    DataLength { expected: usize, found: usize },
    #[error("invalid data: {0}")]
    Decode(String),
}

impl AccessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AccessError::ZeroLength(_)
            | AccessError::Overflow { .. }
            | AccessError::OutOfRange { .. } => ErrorCode::OUT_OF_RANGE,
            AccessError::TooLong(_) | AccessError::DataLength { .. } | AccessError::Decode(_) => {
                ErrorCode::DECODE
            }
        }
    }
}

fn check_range<T: Target>(target: &T, addr: u32, len: u32) -> Result<(), AccessError> {
    if len == 0 {
        return Err(AccessError::ZeroLength(addr));
    }
    if len > MAX_MEMORY_TRANSFER {
        return Err(AccessError::TooLong(len));
    }
    if addr.checked_add(len).is_none() {
        return Err(AccessError::Overflow { addr, len });
    }
    if !target.is_accessible(addr, len) {
        return Err(AccessError::OutOfRange { addr, len });
    }
    Ok(())
}

/// Reads exactly `len` bytes or nothing at all.
pub fn read<T: Target>(target: &T, addr: u32, len: u32) -> Result<Vec<u8>, AccessError> {
    check_range(target, addr, len)?;
    let mut buf = vec![0; len as usize];
    target.read_memory(addr, &mut buf).map_err(|err| {
        log::warn!("target refused read of {:#010x}: {}", addr, err);
        AccessError::OutOfRange { addr, len }
    })?;
    Ok(buf)
}

/// Writes the `2 * len` hex digits of `data`. Nothing is written unless the
/// whole request is valid.
pub fn write<T: Target>(target: &mut T, addr: u32, len: u32, data: &str) -> Result<(), AccessError> {
    check_range(target, addr, len)?;
    let expected = len as usize * 2;
    if data.len() != expected {
        return Err(AccessError::DataLength {
            expected,
            found: data.len(),
        });
    }
    let bytes = decode_hex_bytes(data).map_err(|err| AccessError::Decode(err.to_string()))?;
    target.write_memory(addr, &bytes).map_err(|err| {
        log::warn!("target refused write of {:#010x}: {}", addr, err);
        AccessError::OutOfRange { addr, len }
    })
}

#[cfg(test)]
mod tests {
    use mips_emulator::memory::{FLASH_START, RAM_END, RAM_START};
    use mips_emulator::MipsCpu;

    use super::*;

    #[test]
    fn reads_exactly_len_bytes() {
        let mut cpu = MipsCpu::new();
        cpu.mem_mut().write_raw(RAM_START, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(read(&cpu, RAM_START, 4), Ok(vec![1, 2, 3, 4]));
        assert_eq!(read(&cpu, RAM_START + 4, 1), Ok(vec![5]));
    }

    #[test]
    fn written_bytes_read_back() {
        let mut cpu = MipsCpu::new();
        write(&mut cpu, RAM_START + 0x10, 3, "a1B2c3").unwrap();
        assert_eq!(read(&cpu, RAM_START + 0x10, 3), Ok(vec![0xa1, 0xb2, 0xc3]));
        // the debugger may patch flash
        write(&mut cpu, FLASH_START, 1, "ff").unwrap();
        assert_eq!(read(&cpu, FLASH_START, 1), Ok(vec![0xff]));
    }

    #[test]
    fn bad_ranges_are_rejected() {
        let cpu = MipsCpu::new();
        assert_eq!(read(&cpu, RAM_START, 0), Err(AccessError::ZeroLength(RAM_START)));
        assert_eq!(
            read(&cpu, 0xffff_fffe, 4),
            Err(AccessError::Overflow { addr: 0xffff_fffe, len: 4 })
        );
        assert_eq!(
            read(&cpu, RAM_END - 2, 4),
            Err(AccessError::OutOfRange { addr: RAM_END - 2, len: 4 })
        );
        assert_eq!(read(&cpu, 0, 4).unwrap_err().code(), ErrorCode::OUT_OF_RANGE);
        assert_eq!(
            read(&cpu, RAM_START, MAX_MEMORY_TRANSFER + 1).unwrap_err().code(),
            ErrorCode::DECODE
        );
    }

    #[test]
    fn rejected_writes_change_nothing() {
        let mut cpu = MipsCpu::new();
        let err = write(&mut cpu, RAM_START, 2, "abc").unwrap_err();
        assert_eq!(err, AccessError::DataLength { expected: 4, found: 3 });
        assert_eq!(err.code(), ErrorCode::DECODE);
        assert_eq!(write(&mut cpu, RAM_START, 1, "zz").unwrap_err().code(), ErrorCode::DECODE);
        assert_eq!(
            write(&mut cpu, RAM_END - 1, 2, "1122").unwrap_err().code(),
            ErrorCode::OUT_OF_RANGE
        );
        assert_eq!(read(&cpu, RAM_END - 1, 1), Ok(vec![0]));
        assert_eq!(read(&cpu, RAM_START, 2), Ok(vec![0, 0]));
    }
}
