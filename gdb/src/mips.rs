//! [`Target`] implementation for the emulated MIPS32 machine.

use mips_emulator::{CpuFault, MemoryError, MipsCpu};

use crate::registers::{Endian, RegisterDesc, RegisterLayout, RegisterSet};
use crate::signal::Signal;
use crate::target::{EngineFault, RunControl, Target};

macro_rules! regs32 {
    ($($name:literal),* $(,)?) => {
        [$(RegisterDesc { name: $name, bitsize: 32 }),*]
    };
}

static MIPS_REGS: [RegisterDesc; 72] = regs32![
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3",
    "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7",
    "t8", "t9", "k0", "k1", "gp", "sp", "s8", "ra",
    "sr", "lo", "hi", "bad", "cause", "pc",
    "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7",
    "f8", "f9", "f10", "f11", "f12", "f13", "f14", "f15",
    "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23",
    "f24", "f25", "f26", "f27", "f28", "f29", "f30", "f31",
    "fsr", "fir",
];

/// GDB's `mips` numbering: 32 gprs, sr, lo, hi, bad, cause, pc, 32 fprs, fsr, fir.
pub static MIPS_LAYOUT: RegisterLayout = RegisterLayout {
    regs: &MIPS_REGS,
    endian: Endian::Big,
};

pub mod regno {
    pub const SR: usize = 32;
    pub const LO: usize = 33;
    pub const HI: usize = 34;
    pub const BAD: usize = 35;
    pub const CAUSE: usize = 36;
    pub const PC: usize = 37;
    pub const F0: usize = 38;
    pub const FSR: usize = 70;
    pub const FIR: usize = 71;
}

pub fn fault_signal(fault: &CpuFault) -> Signal {
    match fault {
        CpuFault::Break(_) => Signal::SIGTRAP,
        CpuFault::ReservedInstruction { .. } => Signal::SIGILL,
        CpuFault::Memory(MemoryError::Unmapped(_) | MemoryError::ReadOnly(_)) => Signal::SIGSEGV,
        CpuFault::Memory(MemoryError::Misaligned(_)) => Signal::SIGBUS,
        CpuFault::DivideByZero(_) => Signal::SIGFPE,
        CpuFault::Syscall(_) => Signal::SIGSYS,
    }
}

impl From<CpuFault> for EngineFault {
    fn from(fault: CpuFault) -> Self {
        EngineFault {
            signal: fault_signal(&fault),
            message: fault.to_string(),
        }
    }
}

impl Target for MipsCpu {
    type Error = MemoryError;

    fn register_layout(&self) -> &'static RegisterLayout {
        &MIPS_LAYOUT
    }

    fn read_registers(&self, regs: &mut RegisterSet) {
        for (i, val) in self.reg().iter().enumerate() {
            regs.set(i, *val as u64);
        }
        let cp0 = self.cp0();
        regs.set(regno::SR, cp0.status as u64);
        regs.set(regno::LO, self.lo() as u64);
        regs.set(regno::HI, self.hi() as u64);
        regs.set(regno::BAD, cp0.badvaddr as u64);
        regs.set(regno::CAUSE, cp0.cause as u64);
        regs.set(regno::PC, self.pc() as u64);
        let fpu = self.fpu();
        for (i, val) in fpu.fpr.iter().enumerate() {
            regs.set(regno::F0 + i, *val as u64);
        }
        regs.set(regno::FSR, fpu.fcsr as u64);
        regs.set(regno::FIR, fpu.fir as u64);
    }

    fn write_registers(&mut self, regs: &RegisterSet) {
        let get = |regno: usize| regs.get(regno).unwrap_or(0) as u32;

        // r0 is hard wired
        for i in 1..32 {
            self.reg_mut()[i] = get(i);
        }
        self.set_lo(get(regno::LO));
        self.set_hi(get(regno::HI));
        let cp0 = self.cp0_mut();
        cp0.status = get(regno::SR);
        cp0.badvaddr = get(regno::BAD);
        cp0.cause = get(regno::CAUSE);
        let fpu = self.fpu_mut();
        for i in 0..32 {
            fpu.fpr[i] = get(regno::F0 + i);
        }
        fpu.fcsr = get(regno::FSR);
        fpu.fir = get(regno::FIR);

        // keep a pending branch unless the pc actually moves
        let pc = get(regno::PC);
        if pc != self.pc() {
            self.set_pc(pc);
        }
    }

    fn is_accessible(&self, addr: u32, len: u32) -> bool {
        self.mem().is_mapped(addr, len)
    }

    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.mem().read_raw(addr, buf)
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.mem_mut().write_raw(addr, data)
    }

    fn pc(&self) -> u32 {
        MipsCpu::pc(self)
    }

    fn set_pc(&mut self, pc: u32) {
        MipsCpu::set_pc(self, pc)
    }

    fn step(&mut self) -> Result<(), EngineFault> {
        MipsCpu::step(self).map_err(EngineFault::from)
    }

    fn run(&mut self, on_boundary: &mut dyn FnMut(u32) -> RunControl) -> Result<(), EngineFault> {
        self.run_until(|pc| on_boundary(pc) == RunControl::Halt)
            .map_err(EngineFault::from)
    }
}
