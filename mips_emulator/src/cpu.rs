use thiserror::Error;

use crate::memory::{Memory, MemoryError, FLASH_START};

//instruction field extraction
macro_rules! jump_immediate_address {
    ($expr:expr) => {
        ($expr as u32) & 0x03FF_FFFF
    };
}

macro_rules! immediate_immediate {
    ($expr:expr) => {
        ((($expr as u32) << 16) as i32 >> 16) as u32
    };
}

macro_rules! immediate_immediate_address {
    ($expr:expr) => {
        ((($expr as u32) << 16) as i32 >> 14) as u32
    };
}

macro_rules! immediate_immediate_unsigned {
    ($expr:expr) => {
        ($expr as u32) & 0xFFFF
    };
}

macro_rules! register_s {
    ($expr:expr) => {
        ((($expr as u32) >> 21) & 0b11111) as usize
    };
}

macro_rules! register_t {
    ($expr:expr) => {
        ((($expr as u32) >> 16) & 0b11111) as usize
    };
}

macro_rules! register_d {
    ($expr:expr) => {
        ((($expr as u32) >> 11) & 0b11111) as usize
    };
}

macro_rules! register_a {
    ($expr:expr) => {
        (($expr as u32) >> 6) & 0b11111
    };
}

/// Conditions that abort the current instruction.
///
/// The CPU state is rolled back to the faulting instruction so a debugger
/// sees the pc of the instruction that raised it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuFault {
    #[error("break instruction at {0:#010x}")]
    Break(u32),
    #[error("syscall at {0:#010x}")]
    Syscall(u32),
    #[error("reserved instruction {instruction:#010x} at {pc:#010x}")]
    ReservedInstruction { pc: u32, instruction: u32 },
    #[error("integer divide by zero at {0:#010x}")]
    DivideByZero(u32),
    #[error("memory fault: {0}")]
    Memory(#[from] MemoryError),
}

/// System control coprocessor registers visible to a debugger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cp0 {
    pub status: u32,
    pub cause: u32,
    pub badvaddr: u32,
}

impl Cp0 {
    const BADVADDR: usize = 8;
    const STATUS: usize = 12;
    const CAUSE: usize = 13;
}

/// Floating point register file. No FPU instructions are executed, the
/// registers only hold what software or a debugger put there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fpu {
    pub fpr: [u32; 32],
    pub fcsr: u32,
    pub fir: u32,
}

pub struct MipsCpu {
    pc: u32,
    reg: [u32; 32],
    lo: u32,
    hi: u32,
    cp0: Cp0,
    fpu: Fpu,
    /// Branch target taken after the delay slot instruction retires.
    delayed_jump: Option<u32>,
    mem: Memory,
    instructions: u64,
}

impl Default for MipsCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl MipsCpu {
    pub fn new() -> Self {
        Self {
            pc: FLASH_START,
            reg: [0; 32],
            lo: 0,
            hi: 0,
            cp0: Cp0::default(),
            fpu: Fpu::default(),
            delayed_jump: None,
            mem: Memory::new(),
            instructions: 0,
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Redirects execution, dropping any pending branch.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.delayed_jump = None;
    }

    pub fn reg(&self) -> &[u32; 32] {
        &self.reg
    }

    pub fn reg_mut(&mut self) -> &mut [u32; 32] {
        &mut self.reg
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn set_hi(&mut self, val: u32) {
        self.hi = val;
    }

    pub fn set_lo(&mut self, val: u32) {
        self.lo = val;
    }

    pub fn cp0(&self) -> &Cp0 {
        &self.cp0
    }

    pub fn cp0_mut(&mut self) -> &mut Cp0 {
        &mut self.cp0
    }

    pub fn fpu(&self) -> &Fpu {
        &self.fpu
    }

    pub fn fpu_mut(&mut self) -> &mut Fpu {
        &mut self.fpu
    }

    pub fn mem(&self) -> &Memory {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// Number of retired instructions since the last reset.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn is_in_delay_slot(&self) -> bool {
        self.delayed_jump.is_some()
    }

    pub fn reset(&mut self, entry: u32) {
        self.reg = [0; 32];
        self.lo = 0;
        self.hi = 0;
        self.cp0 = Cp0::default();
        self.fpu = Fpu::default();
        self.instructions = 0;
        self.set_pc(entry);
    }

    /// Copies a raw firmware image to the start of flash.
    pub fn load_flash(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.mem.write_raw(FLASH_START, image)
    }

    /// Executes instructions until `should_stop` returns true or a fault occurs.
    ///
    /// `should_stop` is called after every retired instruction with the pc of
    /// the next one, so the instruction at the starting pc always executes.
    pub fn run_until(&mut self, mut should_stop: impl FnMut(u32) -> bool) -> Result<(), CpuFault> {
        loop {
            self.step()?;
            if should_stop(self.pc) {
                return Ok(());
            }
        }
    }

    /// Executes exactly one instruction.
    pub fn step(&mut self) -> Result<(), CpuFault> {
        let pc = self.pc;
        let delayed_jump = self.delayed_jump;
        match self.execute() {
            Ok(()) => {
                self.reg[0] = 0;
                self.instructions += 1;
                Ok(())
            }
            Err(fault) => {
                self.pc = pc;
                self.delayed_jump = delayed_jump;
                if let CpuFault::Memory(
                    MemoryError::Unmapped(addr)
                    | MemoryError::ReadOnly(addr)
                    | MemoryError::Misaligned(addr),
                ) = fault
                {
                    self.cp0.badvaddr = addr;
                }
                log::debug!("cpu fault: {}", fault);
                Err(fault)
            }
        }
    }

    #[inline(always)]
    fn branch(&mut self, taken: bool, op: u32) {
        if taken {
            self.delayed_jump = Some(self.pc.wrapping_add(immediate_immediate_address!(op)));
        }
    }

    /// Likely branches annul the delay slot when not taken.
    #[inline(always)]
    fn branch_likely(&mut self, taken: bool, op: u32) {
        if taken {
            self.branch(true, op);
        } else {
            self.pc = self.pc.wrapping_add(4);
        }
    }

    #[inline(always)]
    fn address(&self, op: u32) -> u32 {
        self.reg[register_s!(op)].wrapping_add(immediate_immediate!(op))
    }

    fn execute(&mut self) -> Result<(), CpuFault> {
        let current = self.pc;
        let op = self.mem.get_u32_alligned(current)?;

        self.pc = match self.delayed_jump.take() {
            Some(target) => target,
            None => current.wrapping_add(4),
        };

        let reserved = CpuFault::ReservedInstruction {
            pc: current,
            instruction: op,
        };

        match op >> 26 {
            0 => match op & 0b111111 {
                // REGISTER formatted instructions
                0b000000 => {
                    //SLL
                    self.reg[register_d!(op)] = self.reg[register_t!(op)] << register_a!(op);
                }
                0b000010 => {
                    //SRL
                    self.reg[register_d!(op)] = self.reg[register_t!(op)] >> register_a!(op);
                }
                0b000011 => {
                    //SRA
                    self.reg[register_d!(op)] =
                        (self.reg[register_t!(op)] as i32 >> register_a!(op)) as u32;
                }
                0b000100 => {
                    //SLLV
                    self.reg[register_d!(op)] =
                        self.reg[register_t!(op)] << (self.reg[register_s!(op)] & 0x1f);
                }
                0b000110 => {
                    //SRLV
                    self.reg[register_d!(op)] =
                        self.reg[register_t!(op)] >> (self.reg[register_s!(op)] & 0x1f);
                }
                0b000111 => {
                    //SRAV
                    self.reg[register_d!(op)] = (self.reg[register_t!(op)] as i32
                        >> (self.reg[register_s!(op)] & 0x1f))
                        as u32;
                }
                0b001000 => {
                    //JR
                    self.delayed_jump = Some(self.reg[register_s!(op)]);
                }
                0b001001 => {
                    //JALR
                    let target = self.reg[register_s!(op)];
                    self.reg[register_d!(op)] = self.pc.wrapping_add(4);
                    self.delayed_jump = Some(target);
                }
                0b001100 => return Err(CpuFault::Syscall(current)),
                0b001101 => return Err(CpuFault::Break(current)),
                0b001111 => {} //SYNC
                0b010000 => {
                    //MFHI
                    self.reg[register_d!(op)] = self.hi;
                }
                0b010001 => {
                    //MTHI
                    self.hi = self.reg[register_s!(op)];
                }
                0b010010 => {
                    //MFLO
                    self.reg[register_d!(op)] = self.lo;
                }
                0b010011 => {
                    //MTLO
                    self.lo = self.reg[register_s!(op)];
                }
                0b011000 => {
                    //MULT
                    let t = self.reg[register_t!(op)] as i32 as i64;
                    let s = self.reg[register_s!(op)] as i32 as i64;
                    let result = t.wrapping_mul(s);
                    self.lo = result as u32;
                    self.hi = (result >> 32) as u32;
                }
                0b011001 => {
                    //MULTU
                    let t = self.reg[register_t!(op)] as u64;
                    let s = self.reg[register_s!(op)] as u64;
                    let result = t * s;
                    self.lo = result as u32;
                    self.hi = (result >> 32) as u32;
                }
                0b011010 => {
                    //DIV
                    let t = self.reg[register_t!(op)] as i32;
                    if t == 0 {
                        return Err(CpuFault::DivideByZero(current));
                    }
                    let s = self.reg[register_s!(op)] as i32;
                    self.lo = s.wrapping_div(t) as u32;
                    self.hi = s.wrapping_rem(t) as u32;
                }
                0b011011 => {
                    //DIVU
                    let t = self.reg[register_t!(op)];
                    if t == 0 {
                        return Err(CpuFault::DivideByZero(current));
                    }
                    let s = self.reg[register_s!(op)];
                    self.lo = s / t;
                    self.hi = s % t;
                }
                // no overflow exceptions, ADD/SUB behave like their unsigned forms
                0b100000 | 0b100001 => {
                    //ADD, ADDU
                    self.reg[register_d!(op)] =
                        self.reg[register_s!(op)].wrapping_add(self.reg[register_t!(op)]);
                }
                0b100010 | 0b100011 => {
                    //SUB, SUBU
                    self.reg[register_d!(op)] =
                        self.reg[register_s!(op)].wrapping_sub(self.reg[register_t!(op)]);
                }
                0b100100 => {
                    //AND
                    self.reg[register_d!(op)] =
                        self.reg[register_s!(op)] & self.reg[register_t!(op)];
                }
                0b100101 => {
                    //OR
                    self.reg[register_d!(op)] =
                        self.reg[register_s!(op)] | self.reg[register_t!(op)];
                }
                0b100110 => {
                    //XOR
                    self.reg[register_d!(op)] =
                        self.reg[register_s!(op)] ^ self.reg[register_t!(op)];
                }
                0b100111 => {
                    //NOR
                    self.reg[register_d!(op)] =
                        !(self.reg[register_s!(op)] | self.reg[register_t!(op)]);
                }
                0b101010 => {
                    //SLT
                    self.reg[register_d!(op)] = ((self.reg[register_s!(op)] as i32)
                        < (self.reg[register_t!(op)] as i32))
                        as u32;
                }
                0b101011 => {
                    //SLTU
                    self.reg[register_d!(op)] =
                        (self.reg[register_s!(op)] < self.reg[register_t!(op)]) as u32;
                }
                _ => return Err(reserved),
            },
            0b000001 => {
                // REGIMM branches
                let s = self.reg[register_s!(op)] as i32;
                match register_t!(op) {
                    0b00000 => self.branch(s < 0, op),         //BLTZ
                    0b00001 => self.branch(s >= 0, op),        //BGEZ
                    0b00010 => self.branch_likely(s < 0, op),  //BLTZL
                    0b00011 => self.branch_likely(s >= 0, op), //BGEZL
                    0b10000 => {
                        //BLTZAL
                        self.reg[31] = self.pc.wrapping_add(4);
                        self.branch(s < 0, op);
                    }
                    0b10001 => {
                        //BGEZAL, BAL when rs is $zero
                        self.reg[31] = self.pc.wrapping_add(4);
                        self.branch(s >= 0, op);
                    }
                    _ => return Err(reserved),
                }
            }
            //Jump formatted instruction
            0b000010 => {
                //J
                self.delayed_jump =
                    Some((self.pc & 0xF000_0000) | (jump_immediate_address!(op) << 2));
            }
            0b000011 => {
                //JAL
                self.reg[31] = self.pc.wrapping_add(4);
                self.delayed_jump =
                    Some((self.pc & 0xF000_0000) | (jump_immediate_address!(op) << 2));
            }

            // branch instructions
            0b000100 => {
                //BEQ
                let taken = self.reg[register_s!(op)] == self.reg[register_t!(op)];
                self.branch(taken, op);
            }
            0b000101 => {
                //BNE
                let taken = self.reg[register_s!(op)] != self.reg[register_t!(op)];
                self.branch(taken, op);
            }
            0b000110 => {
                //BLEZ
                let taken = self.reg[register_s!(op)] as i32 <= 0;
                self.branch(taken, op);
            }
            0b000111 => {
                //BGTZ
                let taken = self.reg[register_s!(op)] as i32 > 0;
                self.branch(taken, op);
            }
            0b010100 => {
                //BEQL
                let taken = self.reg[register_s!(op)] == self.reg[register_t!(op)];
                self.branch_likely(taken, op);
            }
            0b010101 => {
                //BNEL
                let taken = self.reg[register_s!(op)] != self.reg[register_t!(op)];
                self.branch_likely(taken, op);
            }
            0b010110 => {
                //BLEZL
                let taken = self.reg[register_s!(op)] as i32 <= 0;
                self.branch_likely(taken, op);
            }
            0b010111 => {
                //BGTZL
                let taken = self.reg[register_s!(op)] as i32 > 0;
                self.branch_likely(taken, op);
            }

            // IMMEDIATE formatted instructions
            0b001000 | 0b001001 => {
                //ADDI, ADDIU
                self.reg[register_t!(op)] =
                    self.reg[register_s!(op)].wrapping_add(immediate_immediate!(op));
            }
            0b001010 => {
                //SLTI
                self.reg[register_t!(op)] =
                    ((self.reg[register_s!(op)] as i32) < (immediate_immediate!(op) as i32)) as u32;
            }
            0b001011 => {
                //SLTIU
                self.reg[register_t!(op)] =
                    (self.reg[register_s!(op)] < immediate_immediate!(op)) as u32;
            }
            0b001100 => {
                //ANDI
                self.reg[register_t!(op)] =
                    self.reg[register_s!(op)] & immediate_immediate_unsigned!(op);
            }
            0b001101 => {
                //ORI
                self.reg[register_t!(op)] =
                    self.reg[register_s!(op)] | immediate_immediate_unsigned!(op);
            }
            0b001110 => {
                //XORI
                self.reg[register_t!(op)] =
                    self.reg[register_s!(op)] ^ immediate_immediate_unsigned!(op);
            }
            0b001111 => {
                //LUI
                self.reg[register_t!(op)] = immediate_immediate_unsigned!(op) << 16;
            }
            0b010000 => {
                //COP0, only moves to and from the debugger visible registers
                match register_s!(op) {
                    0b00000 => {
                        //MFC0
                        self.reg[register_t!(op)] = match register_d!(op) {
                            Cp0::BADVADDR => self.cp0.badvaddr,
                            Cp0::STATUS => self.cp0.status,
                            Cp0::CAUSE => self.cp0.cause,
                            _ => 0,
                        };
                    }
                    0b00100 => {
                        //MTC0
                        let val = self.reg[register_t!(op)];
                        match register_d!(op) {
                            Cp0::STATUS => self.cp0.status = val,
                            Cp0::CAUSE => self.cp0.cause = val,
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }

            // load instructions
            0b100000 => {
                //LB
                self.reg[register_t!(op)] = self.mem.get_u8(self.address(op))? as i8 as u32;
            }
            0b100001 => {
                //LH
                self.reg[register_t!(op)] =
                    self.mem.get_u16_alligned(self.address(op))? as i16 as u32;
            }
            0b100010 => {
                //LWL
                let addr = self.address(op);
                let word = self.mem.get_u32_alligned(addr & !3)?;
                let rt = self.reg[register_t!(op)];
                self.reg[register_t!(op)] = match addr & 3 {
                    0 => word,
                    1 => (rt & 0x0000_00ff) | (word << 8),
                    2 => (rt & 0x0000_ffff) | (word << 16),
                    _ => (rt & 0x00ff_ffff) | (word << 24),
                };
            }
            0b100011 => {
                //LW
                self.reg[register_t!(op)] = self.mem.get_u32_alligned(self.address(op))?;
            }
            0b100100 => {
                //LBU
                self.reg[register_t!(op)] = self.mem.get_u8(self.address(op))? as u32;
            }
            0b100101 => {
                //LHU
                self.reg[register_t!(op)] = self.mem.get_u16_alligned(self.address(op))? as u32;
            }
            0b100110 => {
                //LWR
                let addr = self.address(op);
                let word = self.mem.get_u32_alligned(addr & !3)?;
                let rt = self.reg[register_t!(op)];
                self.reg[register_t!(op)] = match addr & 3 {
                    0 => (rt & 0xffff_ff00) | (word >> 24),
                    1 => (rt & 0xffff_0000) | (word >> 16),
                    2 => (rt & 0xff00_0000) | (word >> 8),
                    _ => word,
                };
            }

            // store instructions
            0b101000 => {
                //SB
                self.mem
                    .set_u8(self.address(op), self.reg[register_t!(op)] as u8)?;
            }
            0b101001 => {
                //SH
                self.mem
                    .set_u16_alligned(self.address(op), self.reg[register_t!(op)] as u16)?;
            }
            0b101010 => {
                //SWL
                let addr = self.address(op);
                let word = self.mem.get_u32_alligned(addr & !3)?;
                let rt = self.reg[register_t!(op)];
                let word = match addr & 3 {
                    0 => rt,
                    1 => (rt >> 8) | (word & 0xff00_0000),
                    2 => (rt >> 16) | (word & 0xffff_0000),
                    _ => (rt >> 24) | (word & 0xffff_ff00),
                };
                self.mem.set_u32_alligned(addr & !3, word)?;
            }
            0b101011 => {
                //SW
                self.mem
                    .set_u32_alligned(self.address(op), self.reg[register_t!(op)])?;
            }
            0b101110 => {
                //SWR
                let addr = self.address(op);
                let word = self.mem.get_u32_alligned(addr & !3)?;
                let rt = self.reg[register_t!(op)];
                let word = match addr & 3 {
                    0 => (rt << 24) | (word & 0x00ff_ffff),
                    1 => (rt << 16) | (word & 0x0000_ffff),
                    2 => (rt << 8) | (word & 0x0000_00ff),
                    _ => rt,
                };
                self.mem.set_u32_alligned(addr & !3, word)?;
            }
            0b101111 => {} //CACHE

            _ => return Err(reserved),
        }
        Ok(())
    }
}
