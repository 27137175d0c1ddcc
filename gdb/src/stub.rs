use std::fmt::{Debug, Display};

use thiserror::Error;

use crate::{
    connection::Connection,
    dispatch::{DisconnectReason, Dispatcher},
    exec::ExecState,
    packets::{
        codec::{self, CodecError, Frame, ACK, NACK},
        incoming::Command,
        psm::PacketStateMachine,
        response::{ErrorCode, Response},
    },
    target::Target,
};

#[derive(Debug, Error)]
pub enum StubError<E: Debug + Display> {
    #[error("failed to set up the connection: {0}")]
    ConnectionStart(E),
    #[error("failed to read from the connection: {0}")]
    ConnectionRead(E),
    #[error("failed to write to the connection: {0}")]
    ConnectionWrite(E),
    #[error("failed to flush the connection: {0}")]
    ConnectionFlush(E),
}

#[derive(Clone, Debug)]
pub struct StubConfig {
    /// Answer unsupported commands with `-` instead of an empty packet.
    pub nack_unsupported: bool,
    /// Instructions executed between checks for a client interrupt.
    pub interrupt_poll_interval: u32,
    /// Longest frame accepted from the client, in bytes.
    pub max_packet_len: usize,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            nack_unsupported: true,
            interrupt_poll_interval: 1024,
            max_packet_len: PacketStateMachine::DEFAULT_MAX_LEN,
        }
    }
}

/// One debug session between a client connection and a borrowed target.
///
/// The target outlives the session, so a new client can attach to the same
/// machine once the previous one disconnects.
pub struct GDBStub<'t, C: Connection, T: Target> {
    connection: C,
    target: &'t mut T,
    psm: PacketStateMachine,
    dispatcher: Dispatcher,
    cfg: StubConfig,
    last_frame: Vec<u8>,
}

impl<'t, C: Connection, T: Target> GDBStub<'t, C, T> {
    pub fn new(connection: C, target: &'t mut T, cfg: StubConfig) -> Self {
        Self {
            connection,
            target,
            psm: PacketStateMachine::new(cfg.max_packet_len),
            dispatcher: Dispatcher::new(cfg.interrupt_poll_interval),
            cfg,
            last_frame: Vec::new(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serves the client until it detaches, kills the session or hangs up.
    pub fn run_blocking(&mut self) -> Result<DisconnectReason, StubError<C::Error>> {
        self.connection
            .on_session_start()
            .map_err(StubError::ConnectionStart)?;
        if let Some(repr) = self.connection.string_repr() {
            log::info!("session started {}", repr);
        }

        let reason = loop {
            let Some(byte) = self
                .connection
                .read()
                .map_err(StubError::ConnectionRead)?
            else {
                break DisconnectReason::ConnectionClosed;
            };
            self.incomming_data(byte)?;
            if let Some(reason) = self.dispatcher.disconnect_reason() {
                break reason;
            }
        };

        log::info!("session ended: {:?}", reason);
        if let Err(err) = self.connection.on_session_end() {
            log::warn!("closing connection: {}", err);
        }
        Ok(reason)
    }

    pub fn incomming_data(&mut self, byte: u8) -> Result<(), StubError<C::Error>> {
        let Some(raw) = self.psm.incomming_data(byte) else {
            return Ok(());
        };
        match codec::decode(raw) {
            Ok(decoded) => self.incomming_frame(decoded.frame),
            Err(err @ (CodecError::Checksum { .. } | CodecError::DanglingEscape { .. })) => {
                log::debug!("<-- bad packet: {}", err);
                self.write_raw(&[NACK])
            }
            Err(CodecError::NeedMoreData) => Ok(()),
        }
    }

    fn incomming_frame(&mut self, frame: Frame) -> Result<(), StubError<C::Error>> {
        match frame {
            Frame::Ack | Frame::Discarded => Ok(()),
            Frame::Nack => {
                log::debug!("<-- nack, resending last reply");
                let last = std::mem::take(&mut self.last_frame);
                let res = self.write_raw(&last);
                self.last_frame = last;
                res
            }
            Frame::Interrupt => {
                if self.dispatcher.exec().state() == ExecState::Stopped {
                    let response = self.dispatcher.interrupt();
                    self.send(&response, false)
                } else {
                    Ok(())
                }
            }
            Frame::Packet(packet) => {
                let response = match Command::from_payload(&packet.payload) {
                    Ok(command) => self.dispatch(command),
                    Err(err) => {
                        log::debug!("<-- {}", err);
                        Response::err(ErrorCode::DECODE)
                    }
                };
                self.send(&response, true)
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Response {
        let Self {
            connection,
            target,
            dispatcher,
            ..
        } = self;
        let mut interrupted = || poll_interrupt(connection);
        dispatcher.dispatch(command, &mut **target, &mut interrupted)
    }

    fn send(&mut self, response: &Response, ack: bool) -> Result<(), StubError<C::Error>> {
        if !response.is_supported() {
            let reply: &[u8] = if self.cfg.nack_unsupported {
                &[NACK]
            } else {
                b"+$#00"
            };
            return self.write_raw(reply);
        }

        let mut out = Vec::new();
        if ack {
            out.push(ACK);
        }
        if let Some(payload) = response.payload() {
            let frame = codec::frame(&payload);
            out.extend_from_slice(&frame);
            self.last_frame = frame;
        }
        self.write_raw(&out)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), StubError<C::Error>> {
        if data.is_empty() {
            return Ok(());
        }
        log::trace!("--> {}", String::from_utf8_lossy(data));
        self.connection
            .write_all(data)
            .map_err(StubError::ConnectionWrite)?;
        self.connection.flush().map_err(StubError::ConnectionFlush)
    }
}

/// Consumes a pending `0x03`. A broken connection also stops the target so
/// the session can notice it.
fn poll_interrupt<C: Connection>(connection: &mut C) -> bool {
    match connection.peek() {
        Ok(Some(codec::INTERRUPT)) => {
            _ = connection.read();
            log::debug!("<-- interrupt");
            true
        }
        Ok(_) => false,
        Err(err) => {
            log::warn!("connection lost while running: {}", err);
            true
        }
    }
}
