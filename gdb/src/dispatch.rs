//! Routes parsed commands to the register, memory and execution handlers
//! and builds the reply. Nothing in here fails: every problem becomes an
//! `E<nn>` reply or an unsupported marker.

use crate::exec::ExecutionController;
use crate::memory;
use crate::packets::incoming::{Command, ThreadId, ThreadOp};
use crate::packets::response::{ErrorCode, Response};
use crate::registers;
use crate::signal::Signal;
use crate::target::Target;

/// The single thread the stub reports.
pub const THREAD_ID: u32 = 1;

pub const PACKET_SIZE: usize = 0x119;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    Kill,
    Detach,
    ConnectionClosed,
}

#[derive(Debug)]
pub struct Dispatcher {
    exec: ExecutionController,
    general_thread: ThreadId,
    continue_thread: ThreadId,
    memory_thread: ThreadId,
    poll_interval: u32,
    disconnect: Option<DisconnectReason>,
}

impl Dispatcher {
    pub fn new(poll_interval: u32) -> Self {
        Self {
            exec: ExecutionController::new(),
            general_thread: ThreadId::Any,
            continue_thread: ThreadId::Any,
            memory_thread: ThreadId::Any,
            poll_interval,
            disconnect: None,
        }
    }

    pub fn exec(&self) -> &ExecutionController {
        &self.exec
    }

    pub fn exec_mut(&mut self) -> &mut ExecutionController {
        &mut self.exec
    }

    pub fn selected_thread(&self, op: ThreadOp) -> ThreadId {
        match op {
            ThreadOp::General => self.general_thread,
            ThreadOp::Continue => self.continue_thread,
            ThreadOp::Memory => self.memory_thread,
        }
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect
    }

    /// Handles one command. `interrupted` is polled while the target runs.
    pub fn dispatch<T: Target>(
        &mut self,
        command: Command,
        target: &mut T,
        interrupted: &mut dyn FnMut() -> bool,
    ) -> Response {
        log::debug!("dispatching {:?}", command);
        match command {
            Command::qSupported(features) => {
                for (name, supported, value) in &features {
                    log::trace!("client feature {} {} {:?}", name, supported, value);
                }
                Response::ok_string(format!("PacketSize={:x}", PACKET_SIZE))
            }
            Command::MustReplyEmpty => Response::EMPTY,
            Command::SelectThread(op, id) => {
                match op {
                    ThreadOp::General => self.general_thread = id,
                    ThreadOp::Continue => self.continue_thread = id,
                    ThreadOp::Memory => self.memory_thread = id,
                }
                Response::OK
            }
            Command::qTStatus => Response::ok_string("T0;tnotrun:0"),
            Command::qTfV | Command::qTfP => Response::EMPTY,
            Command::qfThreadInfo => Response::ok_string(format!("m{:x}", THREAD_ID)),
            Command::qsThreadInfo => Response::ok_string("l"),
            Command::qAttached => Response::ok_string("0"),
            Command::qC => Response::EMPTY,
            Command::ExceptionReason => Response::stop(self.exec.last_stop().signal()),

            Command::ReadRegisters => Response::ok_string(registers::read_all(target).encode()),
            Command::WriteRegisters(hex) => match registers::write_all(target, &hex) {
                Ok(()) => Response::OK,
                Err(err) => {
                    log::debug!("G rejected: {}", err);
                    Response::err(ErrorCode::DECODE)
                }
            },
            Command::ReadRegister(regno) => match registers::read_one(target, regno) {
                Ok(hex) => Response::ok_string(hex),
                Err(err) => {
                    log::debug!("p rejected: {}", err);
                    Response::err(ErrorCode::DECODE)
                }
            },
            Command::WriteRegister(regno, hex) => match registers::write_one(target, regno, &hex) {
                Ok(()) => Response::OK,
                Err(err) => {
                    log::debug!("P rejected: {}", err);
                    Response::err(ErrorCode::DECODE)
                }
            },

            Command::ReadMemory { addr, len } => match memory::read(target, addr, len) {
                Ok(data) => Response::hex(&data),
                Err(err) => {
                    log::debug!("m rejected: {}", err);
                    Response::err(err.code())
                }
            },
            Command::WriteMemory { addr, len, data } => {
                match memory::write(target, addr, len, &data) {
                    Ok(()) => Response::OK,
                    Err(err) => {
                        log::debug!("M rejected: {}", err);
                        Response::err(err.code())
                    }
                }
            }

            Command::InsertSoftwareBreakpoint { addr, kind } => {
                log::debug!("breakpoint at {:#010x} (kind {})", addr, kind);
                self.exec.set_breakpoint(addr);
                Response::OK
            }
            Command::RemoveSoftwareBreakpoint { addr, .. } => {
                self.exec.clear_breakpoint(addr);
                Response::OK
            }

            Command::ContinueAt(addr) => self.resume(target, addr, false, interrupted),
            Command::StepAt(addr) => self.resume(target, addr, true, interrupted),
            Command::ContinueAtSignal(sig, addr) => {
                log::debug!("dropping signal {:?} on continue", Signal::from_protocol_u8(sig));
                self.resume(target, addr, false, interrupted)
            }
            Command::StepAtSignal(sig, addr) => {
                log::debug!("dropping signal {:?} on step", Signal::from_protocol_u8(sig));
                self.resume(target, addr, true, interrupted)
            }

            Command::Kill => {
                self.disconnect = Some(DisconnectReason::Kill);
                Response::SILENT
            }
            Command::Detach => {
                self.disconnect = Some(DisconnectReason::Detach);
                Response::OK
            }

            Command::Unsupported(_) => Response::NO_REPLY,
        }
    }

    fn resume<T: Target>(
        &mut self,
        target: &mut T,
        addr: Option<u32>,
        step: bool,
        interrupted: &mut dyn FnMut() -> bool,
    ) -> Response {
        if let Some(addr) = addr {
            target.set_pc(addr);
        }
        let reason = if step {
            self.exec.step(target)
        } else {
            self.exec.resume(target, interrupted, self.poll_interval)
        };
        Response::stop(reason.signal())
    }

    /// A `0x03` received while the target is stopped.
    pub fn interrupt(&mut self) -> Response {
        Response::stop(self.exec.interrupt().signal())
    }
}

#[cfg(test)]
mod tests {
    use mips_emulator::memory::RAM_START;
    use mips_emulator::MipsCpu;

    use super::*;
    use crate::mips::regno;

    fn run(dispatcher: &mut Dispatcher, cpu: &mut MipsCpu, packet: &str) -> Option<String> {
        let command = Command::from_payload(packet.as_bytes()).unwrap();
        let response = dispatcher.dispatch(command, cpu, &mut || false);
        response
            .payload()
            .map(|p| String::from_utf8(p).unwrap())
    }

    #[test]
    fn canned_replies() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        let mut ask = |packet: &str| run(&mut d, &mut cpu, packet);
        assert_eq!(ask("qSupported:swbreak+").as_deref(), Some("PacketSize=119"));
        assert_eq!(ask("vMustReplyEmpty").as_deref(), Some(""));
        assert_eq!(ask("Hg0").as_deref(), Some("OK"));
        assert_eq!(ask("Hc-1").as_deref(), Some("OK"));
        assert_eq!(ask("qTStatus").as_deref(), Some("T0;tnotrun:0"));
        assert_eq!(ask("qTfV").as_deref(), Some(""));
        assert_eq!(ask("qTfP").as_deref(), Some(""));
        assert_eq!(ask("qfThreadInfo").as_deref(), Some("m1"));
        assert_eq!(ask("qsThreadInfo").as_deref(), Some("l"));
        assert_eq!(ask("qAttached").as_deref(), Some("0"));
        assert_eq!(ask("qC").as_deref(), Some(""));
        assert_eq!(ask("?").as_deref(), Some("S05"));
        assert_eq!(ask("vCont?"), None);
    }

    #[test]
    fn thread_selection_is_recorded() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        run(&mut d, &mut cpu, "Hc-1");
        run(&mut d, &mut cpu, "Hg1");
        assert_eq!(d.selected_thread(ThreadOp::Continue), ThreadId::All);
        assert_eq!(d.selected_thread(ThreadOp::General), ThreadId::Id(1));
        assert_eq!(d.selected_thread(ThreadOp::Memory), ThreadId::Any);
    }

    #[test]
    fn unsupported_commands_have_no_reply() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        let response = d.dispatch(Command::Unsupported("qOffsets".into()), &mut cpu, &mut || false);
        assert!(!response.is_supported());
    }

    #[test]
    fn registers_round_trip() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        let mut regs = run(&mut d, &mut cpu, "g").unwrap();
        assert_eq!(regs.len(), 72 * 8);

        regs.replace_range(8 * 4..8 * 5, "cafef00d");
        assert_eq!(run(&mut d, &mut cpu, &format!("G{}", regs)).as_deref(), Some("OK"));
        assert_eq!(cpu.reg()[4], 0xcafe_f00d);
        assert_eq!(run(&mut d, &mut cpu, "g").unwrap(), regs);

        assert_eq!(run(&mut d, &mut cpu, "G00").as_deref(), Some("E01"));
        assert_eq!(cpu.reg()[4], 0xcafe_f00d);
    }

    #[test]
    fn single_registers() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        let pc = format!("P{:x}=80000010", regno::PC);
        assert_eq!(run(&mut d, &mut cpu, &pc).as_deref(), Some("OK"));
        assert_eq!(cpu.pc(), RAM_START + 0x10);
        assert_eq!(
            run(&mut d, &mut cpu, &format!("p{:x}", regno::PC)).as_deref(),
            Some("80000010")
        );
        assert_eq!(run(&mut d, &mut cpu, "p48").as_deref(), Some("E01"));
        assert_eq!(run(&mut d, &mut cpu, "P1=12").as_deref(), Some("E01"));
    }

    #[test]
    fn memory_commands() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        assert_eq!(run(&mut d, &mut cpu, "M80000000,4:10203040").as_deref(), Some("OK"));
        assert_eq!(run(&mut d, &mut cpu, "m80000000,4").as_deref(), Some("10203040"));
        assert_eq!(run(&mut d, &mut cpu, "m80000002,1").as_deref(), Some("30"));
        assert_eq!(run(&mut d, &mut cpu, "m0,4").as_deref(), Some("E0e"));
        assert_eq!(run(&mut d, &mut cpu, "m80000000,0").as_deref(), Some("E0e"));
        assert_eq!(run(&mut d, &mut cpu, "mfffffffe,4").as_deref(), Some("E0e"));
        assert_eq!(run(&mut d, &mut cpu, "M80000000,4:1020").as_deref(), Some("E01"));
    }

    #[test]
    fn breakpoints_stop_continue() {
        let mut cpu = MipsCpu::new();
        let program: Vec<u8> = [0x2508_0001u32, 0x2508_0001, 0x2508_0001, 0x0000_000D]
            .iter()
            .flat_map(|op| op.to_be_bytes())
            .collect();
        cpu.mem_mut().write_raw(RAM_START, &program).unwrap();
        let mut d = Dispatcher::new(64);

        assert_eq!(run(&mut d, &mut cpu, "Z0,80000008,4").as_deref(), Some("OK"));
        assert_eq!(run(&mut d, &mut cpu, "Z0,80000008,4").as_deref(), Some("OK"));
        assert_eq!(run(&mut d, &mut cpu, "c80000000").as_deref(), Some("S05"));
        assert_eq!(cpu.pc(), RAM_START + 8);
        assert_eq!(run(&mut d, &mut cpu, "s").as_deref(), Some("S05"));
        assert_eq!(cpu.pc(), RAM_START + 12);
        assert_eq!(run(&mut d, &mut cpu, "z0,80000008,4").as_deref(), Some("OK"));
        assert_eq!(run(&mut d, &mut cpu, "z0,80000008,4").as_deref(), Some("OK"));
        // the break instruction itself reports a trap
        assert_eq!(run(&mut d, &mut cpu, "c").as_deref(), Some("S05"));
        assert_eq!(cpu.reg()[8], 3);
    }

    #[test]
    fn faults_become_signals() {
        let mut cpu = MipsCpu::new();
        cpu.mem_mut().write_raw(RAM_START, &0x8C02_0000u32.to_be_bytes()).unwrap(); // lw $v0, 0($zero)
        let mut d = Dispatcher::new(64);
        assert_eq!(run(&mut d, &mut cpu, "s80000000").as_deref(), Some("S0b"));
        assert_eq!(run(&mut d, &mut cpu, "?").as_deref(), Some("S0b"));
        assert_eq!(cpu.pc(), RAM_START);
    }

    #[test]
    fn kill_and_detach() {
        let mut cpu = MipsCpu::new();
        let mut d = Dispatcher::new(64);
        assert_eq!(d.disconnect_reason(), None);
        assert_eq!(run(&mut d, &mut cpu, "D").as_deref(), Some("OK"));
        assert_eq!(d.disconnect_reason(), Some(DisconnectReason::Detach));

        let mut d = Dispatcher::new(64);
        assert_eq!(run(&mut d, &mut cpu, "k"), None);
        assert_eq!(d.disconnect_reason(), Some(DisconnectReason::Kill));
    }

    #[test]
    fn interrupt_while_stopped() {
        let mut d = Dispatcher::new(64);
        assert_eq!(d.interrupt().payload(), Some(b"S02".to_vec()));
        assert_eq!(d.exec().last_stop().signal(), Signal::SIGINT);
    }
}
