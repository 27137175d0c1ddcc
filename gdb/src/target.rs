use std::fmt::{Debug, Display};

use crate::registers::{RegisterLayout, RegisterSet};
use crate::signal::Signal;

/// An engine fault already translated to the signal reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    pub signal: Signal,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    Continue,
    Halt,
}

/// The emulator as seen by the stub.
pub trait Target {
    type Error: Debug + Display;

    fn register_layout(&self) -> &'static RegisterLayout;
    /// Fills `regs` with the current values, in layout order.
    fn read_registers(&self, regs: &mut RegisterSet);
    fn write_registers(&mut self, regs: &RegisterSet);

    /// True when every byte of `addr..addr + len` can be read and written.
    fn is_accessible(&self, addr: u32, len: u32) -> bool;
    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    fn pc(&self) -> u32;
    fn set_pc(&mut self, pc: u32);

    /// Executes one instruction.
    fn step(&mut self) -> Result<(), EngineFault>;
    /// Executes until `on_boundary`, called with the next pc after every
    /// instruction, returns [`RunControl::Halt`].
    fn run(&mut self, on_boundary: &mut dyn FnMut(u32) -> RunControl) -> Result<(), EngineFault>;
}
