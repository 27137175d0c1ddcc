use std::collections::VecDeque;
use std::convert::Infallible;

use mips_emulator::memory::RAM_START;
use mips_emulator::MipsCpu;
use mips_gdb_stub::connection::Connection;
use mips_gdb_stub::packets::codec;
use mips_gdb_stub::{DisconnectReason, GDBStub, StubConfig};

/// Scripted client: bytes queued up front, everything the stub writes kept.
#[derive(Default)]
pub struct ScriptedConnection {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    pub started: bool,
    pub ended: bool,
}

impl ScriptedConnection {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl Connection for ScriptedConnection {
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        self.started = true;
        Ok(())
    }

    fn on_session_end(&mut self) -> Result<(), Self::Error> {
        self.ended = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.input.pop_front())
    }

    fn peek(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.input.front().copied())
    }
}

/// `$payload#cc` as a client would send it.
pub fn packet(payload: &str) -> Vec<u8> {
    codec::frame(payload.as_bytes())
}

/// The stub's answer to a packet: ack plus framed reply.
pub fn reply(payload: &str) -> String {
    String::from_utf8(codec::encode(payload.as_bytes())).unwrap()
}

pub fn script(packets: &[&str]) -> Vec<u8> {
    packets.iter().flat_map(|p| packet(p)).collect()
}

pub struct Outcome {
    pub reason: DisconnectReason,
    pub output: String,
    pub connection: ScriptedConnection,
}

pub fn run_session_with(cpu: &mut MipsCpu, input: &[u8], cfg: StubConfig) -> Outcome {
    let mut stub = GDBStub::new(ScriptedConnection::new(input), cpu, cfg);
    let reason = stub.run_blocking().unwrap();
    let connection = stub.into_connection();
    Outcome {
        reason,
        output: String::from_utf8_lossy(&connection.output).into_owned(),
        connection,
    }
}

pub fn run_session(cpu: &mut MipsCpu, input: &[u8]) -> Outcome {
    run_session_with(cpu, input, StubConfig::default())
}

pub fn cpu_with_program(program: &[u32]) -> MipsCpu {
    let mut cpu = MipsCpu::new();
    let image: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
    cpu.mem_mut().write_raw(RAM_START, &image).unwrap();
    cpu.set_pc(RAM_START);
    cpu
}
