use thiserror::Error;

const SEG_SIZE: usize = 0x10000;

pub const RAM_START: u32 = 0x8000_0000;
pub const RAM_END: u32 = 0x8200_0000;
pub const RAM_SIZE: u32 = RAM_END - RAM_START;

pub const FLASH_START: u32 = 0x9fc0_0000;
pub const FLASH_END: u32 = 0x9fe0_0000;
pub const FLASH_SIZE: u32 = FLASH_END - FLASH_START;

/// Uncached KSEG1 addresses mirror KSEG0, strip the bit before lookup.
const KSEG1_ALIAS_BIT: u32 = 0x2000_0000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0:#010x} is not mapped")]
    Unmapped(u32),
    #[error("address {0:#010x} is read only")]
    ReadOnly(u32),
    #[error("misaligned access at {0:#010x}")]
    Misaligned(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RegionKind {
    Ram,
    Flash,
}

/// Sparse backing store, pages are only allocated once written.
struct Region {
    kind: RegionKind,
    start: u32,
    size: u32,
    pages: Vec<Option<Box<[u8; SEG_SIZE]>>>,
}

impl Region {
    fn new(kind: RegionKind, start: u32, size: u32) -> Self {
        let count = (size as usize).div_ceil(SEG_SIZE);
        let mut pages = Vec::with_capacity(count);
        pages.resize_with(count, || None);
        Self {
            kind,
            start,
            size,
            pages,
        }
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr - self.start < self.size
    }

    fn read(&self, addr: u32) -> u8 {
        let off = (addr - self.start) as usize;
        match &self.pages[off / SEG_SIZE] {
            Some(page) => page[off % SEG_SIZE],
            None => 0,
        }
    }

    fn write(&mut self, addr: u32, byte: u8) {
        let off = (addr - self.start) as usize;
        let page = self.pages[off / SEG_SIZE].get_or_insert_with(|| Box::new([0; SEG_SIZE]));
        page[off % SEG_SIZE] = byte;
    }

    fn clear(&mut self) {
        self.pages.iter_mut().for_each(|page| *page = None);
    }
}

/// Physical memory map of the board: RAM plus a boot flash.
///
/// All multi-byte accessors are big endian. The CPU cannot store into flash,
/// the `*_raw` accessors used by loaders and debuggers can.
pub struct Memory {
    regions: [Region; 2],
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            regions: [
                Region::new(RegionKind::Ram, RAM_START, RAM_SIZE),
                Region::new(RegionKind::Flash, FLASH_START, FLASH_SIZE),
            ],
        }
    }

    #[inline(always)]
    fn translate(addr: u32) -> u32 {
        addr & !KSEG1_ALIAS_BIT
    }

    fn region(&self, addr: u32) -> Result<&Region, MemoryError> {
        let phys = Self::translate(addr);
        self.regions
            .iter()
            .find(|r| r.contains(phys))
            .ok_or(MemoryError::Unmapped(addr))
    }

    fn region_mut(&mut self, addr: u32) -> Result<&mut Region, MemoryError> {
        let phys = Self::translate(addr);
        self.regions
            .iter_mut()
            .find(|r| r.contains(phys))
            .ok_or(MemoryError::Unmapped(addr))
    }

    /// True when every byte of `addr..addr + len` is backed by a region.
    pub fn is_mapped(&self, addr: u32, len: u32) -> bool {
        if len == 0 {
            return false;
        }
        let Some(last) = addr.checked_add(len - 1) else {
            return false;
        };
        let (first, last) = (Self::translate(addr), Self::translate(last));
        // the alias bit must not flip inside the range
        if last < first {
            return false;
        }
        self.regions
            .iter()
            .any(|r| r.contains(first) && r.contains(last))
    }

    pub fn get_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        let phys = Self::translate(addr);
        Ok(self.region(addr)?.read(phys))
    }

    pub fn get_u16_alligned(&self, addr: u32) -> Result<u16, MemoryError> {
        Self::check_allignment(addr, 2)?;
        Ok(u16::from_be_bytes([
            self.get_u8(addr)?,
            self.get_u8(addr.wrapping_add(1))?,
        ]))
    }

    pub fn get_u32_alligned(&self, addr: u32) -> Result<u32, MemoryError> {
        Self::check_allignment(addr, 4)?;
        let mut buf = [0u8; 4];
        self.read_raw(addr, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn set_u8(&mut self, addr: u32, val: u8) -> Result<(), MemoryError> {
        let phys = Self::translate(addr);
        let region = self.region_mut(addr)?;
        if region.kind == RegionKind::Flash {
            return Err(MemoryError::ReadOnly(addr));
        }
        region.write(phys, val);
        Ok(())
    }

    pub fn set_u16_alligned(&mut self, addr: u32, val: u16) -> Result<(), MemoryError> {
        Self::check_allignment(addr, 2)?;
        let [hi, lo] = val.to_be_bytes();
        self.set_u8(addr, hi)?;
        self.set_u8(addr.wrapping_add(1), lo)
    }

    pub fn set_u32_alligned(&mut self, addr: u32, val: u32) -> Result<(), MemoryError> {
        Self::check_allignment(addr, 4)?;
        if self.region(addr)?.kind == RegionKind::Flash {
            return Err(MemoryError::ReadOnly(addr));
        }
        self.write_raw(addr, &val.to_be_bytes())
    }

    /// Reads `buf.len()` bytes, failing without side effects if any byte is unmapped.
    pub fn read_raw(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        if !buf.is_empty() && !self.is_mapped(addr, buf.len() as u32) {
            return Err(MemoryError::Unmapped(addr));
        }
        let region = self.region(addr)?;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = region.read(Self::translate(addr) + i as u32);
        }
        Ok(())
    }

    /// Writes ignoring flash protection. The whole range is validated first.
    pub fn write_raw(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.is_mapped(addr, data.len() as u32) {
            return Err(MemoryError::Unmapped(addr));
        }
        let phys = Self::translate(addr);
        let region = self.region_mut(addr)?;
        for (i, byte) in data.iter().enumerate() {
            region.write(phys + i as u32, *byte);
        }
        Ok(())
    }

    pub fn unload_all_pages(&mut self) {
        self.regions.iter_mut().for_each(Region::clear);
    }

    #[inline(always)]
    fn check_allignment(addr: u32, size: u32) -> Result<(), MemoryError> {
        if cfg!(feature = "memory_allignment_check") && addr % size != 0 {
            Err(MemoryError::Misaligned(addr))
        } else {
            Ok(())
        }
    }
}
