use std::collections::BTreeMap;

use crate::signal::Signal;
use crate::target::{RunControl, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Stopped,
    Running,
    SteppingOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Trap,
    Signal(Signal),
    None,
}

impl StopReason {
    pub fn signal(&self) -> Signal {
        match self {
            StopReason::Trap => Signal::SIGTRAP,
            StopReason::Signal(sig) => *sig,
            StopReason::None => Signal::SIGZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub addr: u32,
    pub enabled: bool,
}

/// Run state and software breakpoints of the single debugged thread.
#[derive(Debug)]
pub struct ExecutionController {
    state: ExecState,
    last_stop: StopReason,
    breakpoints: BTreeMap<u32, Breakpoint>,
}

impl Default for ExecutionController {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionController {
    /// A freshly attached target counts as stopped by a trap.
    pub fn new() -> Self {
        Self {
            state: ExecState::Stopped,
            last_stop: StopReason::Trap,
            breakpoints: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn last_stop(&self) -> StopReason {
        self.last_stop
    }

    /// Inserting an existing address is not an error.
    pub fn set_breakpoint(&mut self, addr: u32) {
        self.breakpoints
            .entry(addr)
            .and_modify(|bp| bp.enabled = true)
            .or_insert(Breakpoint {
                addr,
                enabled: true,
            });
    }

    /// Removing a missing address is not an error.
    pub fn clear_breakpoint(&mut self, addr: u32) -> Option<Breakpoint> {
        self.breakpoints.remove(&addr)
    }

    pub fn is_breakpoint(&self, addr: u32) -> bool {
        self.breakpoints.get(&addr).is_some_and(|bp| bp.enabled)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// Runs until an enabled breakpoint is reached, the target faults or
    /// `interrupted` reports a stop request.
    ///
    /// The instruction at the current pc always executes first, so resuming
    /// from a breakpoint makes progress. `interrupted` is polled every
    /// `poll_interval` instructions.
    pub fn resume<T: Target>(
        &mut self,
        target: &mut T,
        interrupted: &mut dyn FnMut() -> bool,
        poll_interval: u32,
    ) -> StopReason {
        self.state = ExecState::Running;
        let breakpoints = &self.breakpoints;
        let poll_interval = poll_interval.max(1);
        let mut since_poll = 0;
        let mut got_interrupt = false;

        let res = target.run(&mut |pc| {
            if breakpoints.get(&pc).is_some_and(|bp| bp.enabled) {
                return RunControl::Halt;
            }
            since_poll += 1;
            if since_poll >= poll_interval {
                since_poll = 0;
                if interrupted() {
                    got_interrupt = true;
                    return RunControl::Halt;
                }
            }
            RunControl::Continue
        });

        let reason = match res {
            Ok(()) if got_interrupt => StopReason::Signal(Signal::SIGINT),
            Ok(()) => StopReason::Trap,
            Err(fault) => {
                log::warn!("target stopped with {}: {}", fault.signal, fault.message);
                StopReason::Signal(fault.signal)
            }
        };
        self.stopped(reason)
    }

    pub fn step<T: Target>(&mut self, target: &mut T) -> StopReason {
        self.state = ExecState::SteppingOne;
        let reason = match target.step() {
            Ok(()) => StopReason::Trap,
            Err(fault) => {
                log::warn!("target stopped with {}: {}", fault.signal, fault.message);
                StopReason::Signal(fault.signal)
            }
        };
        self.stopped(reason)
    }

    /// An interrupt request that arrived while nothing was running.
    pub fn interrupt(&mut self) -> StopReason {
        self.stopped(StopReason::Signal(Signal::SIGINT))
    }

    fn stopped(&mut self, reason: StopReason) -> StopReason {
        log::debug!("stopped: {:?}", reason);
        self.state = ExecState::Stopped;
        self.last_stop = reason;
        reason
    }
}

#[cfg(test)]
mod tests {
    use mips_emulator::memory::RAM_START;
    use mips_emulator::MipsCpu;

    use super::*;

    fn cpu_with_program(program: &[u32]) -> MipsCpu {
        let mut cpu = MipsCpu::new();
        let image: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
        cpu.mem_mut().write_raw(RAM_START, &image).unwrap();
        cpu.set_pc(RAM_START);
        cpu
    }

    const COUNTER: [u32; 5] = [
        0x2508_0001, // addiu $t0, $t0, 1
        0x2508_0001, // addiu $t0, $t0, 1
        0x2508_0001, // addiu $t0, $t0, 1
        0x2508_0001, // addiu $t0, $t0, 1
        0x0000_000D, // break
    ];

    #[test]
    fn starts_stopped_by_a_trap() {
        let exec = ExecutionController::new();
        assert_eq!(exec.state(), ExecState::Stopped);
        assert_eq!(exec.last_stop(), StopReason::Trap);
        assert_eq!(exec.last_stop().signal(), Signal::SIGTRAP);
        assert_eq!(StopReason::None.signal(), Signal::SIGZERO);
    }

    #[test]
    fn breakpoint_bookkeeping_is_idempotent() {
        let mut exec = ExecutionController::new();
        exec.set_breakpoint(RAM_START);
        exec.set_breakpoint(RAM_START);
        assert_eq!(exec.breakpoints().count(), 1);
        assert!(exec.is_breakpoint(RAM_START));

        assert!(exec.clear_breakpoint(RAM_START).is_some());
        assert!(exec.clear_breakpoint(RAM_START).is_none());
        assert!(!exec.is_breakpoint(RAM_START));
    }

    #[test]
    fn continue_stops_at_breakpoint() {
        let mut cpu = cpu_with_program(&COUNTER);
        let mut exec = ExecutionController::new();
        exec.set_breakpoint(RAM_START + 8);

        let reason = exec.resume(&mut cpu, &mut || false, 1);
        assert_eq!(reason, StopReason::Trap);
        assert_eq!(exec.state(), ExecState::Stopped);
        assert_eq!(Target::pc(&cpu), RAM_START + 8);
        assert_eq!(cpu.reg()[8], 2);
    }

    #[test]
    fn resuming_from_a_breakpoint_makes_progress() {
        let mut cpu = cpu_with_program(&COUNTER);
        let mut exec = ExecutionController::new();
        exec.set_breakpoint(RAM_START);
        exec.set_breakpoint(RAM_START + 4);

        assert_eq!(exec.resume(&mut cpu, &mut || false, 1), StopReason::Trap);
        assert_eq!(Target::pc(&cpu), RAM_START + 4);
        assert_eq!(cpu.reg()[8], 1);
    }

    #[test]
    fn faults_stop_with_a_signal() {
        let mut cpu = cpu_with_program(&COUNTER);
        let mut exec = ExecutionController::new();
        let reason = exec.resume(&mut cpu, &mut || false, 1);
        assert_eq!(reason, StopReason::Signal(Signal::SIGTRAP));
        assert_eq!(Target::pc(&cpu), RAM_START + 16);
        assert_eq!(cpu.reg()[8], 4);

        let mut cpu = cpu_with_program(&[0xFC00_0000]);
        assert_eq!(exec.step(&mut cpu), StopReason::Signal(Signal::SIGILL));
        assert_eq!(exec.state(), ExecState::Stopped);
    }

    #[test]
    fn step_runs_one_instruction() {
        let mut cpu = cpu_with_program(&COUNTER);
        let mut exec = ExecutionController::new();
        exec.set_breakpoint(RAM_START + 4);
        assert_eq!(exec.step(&mut cpu), StopReason::Trap);
        assert_eq!(Target::pc(&cpu), RAM_START + 4);
        assert_eq!(cpu.reg()[8], 1);
    }

    #[test]
    fn interrupt_halts_a_run() {
        let mut cpu = cpu_with_program(&[
            0x1000_FFFF, // b .
            0x0000_0000, // nop
        ]);
        let mut exec = ExecutionController::new();
        let mut polls = 0;
        let reason = exec.resume(
            &mut cpu,
            &mut || {
                polls += 1;
                polls == 3
            },
            16,
        );
        assert_eq!(reason, StopReason::Signal(Signal::SIGINT));
        assert_eq!(cpu.instructions(), 48);
        assert_eq!(exec.last_stop(), StopReason::Signal(Signal::SIGINT));
    }
}
