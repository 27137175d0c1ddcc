//! MIPS32 (big endian) machine used as the debug target: a MIPS I integer
//! core with branch delay slots plus the RAM and boot flash of the board.

pub mod cpu;
pub mod memory;

pub use cpu::{Cp0, CpuFault, Fpu, MipsCpu};
pub use memory::{Memory, MemoryError};
