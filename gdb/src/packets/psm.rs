use super::codec::{ACK, END, INTERRUPT, NACK, START};

/// Collects bytes from the wire until a whole frame is buffered.
///
/// Completed frames are handed out as raw bytes for [`super::codec::decode`].
pub struct PacketStateMachine {
    buf: Vec<u8>,
    state: PacketStateMachineStates,
    max_len: usize,
}

impl Default for PacketStateMachine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_LEN)
    }
}

impl PacketStateMachine {
    pub const DEFAULT_MAX_LEN: usize = 0x4000;

    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: PacketStateMachineStates::Ready,
            max_len,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, PacketStateMachineStates::Ready)
    }

    pub fn incomming_data(&mut self, data: u8) -> Option<&[u8]> {
        use PacketStateMachineStates as State;
        match self.state {
            State::Ready => {
                self.buf.clear();
                match data {
                    START => self.state = State::CommandBody,
                    ACK | NACK | INTERRUPT => {}
                    other => {
                        log::trace!("<-- ignoring {:#04x} outside of a packet", other);
                        return None;
                    }
                }
            }
            State::CommandBody if data == START => {
                log::debug!(
                    "<-- packet restarted, dropping {:?}",
                    String::from_utf8_lossy(&self.buf)
                );
                self.buf.clear();
            }
            State::CommandBody if data == END => self.state = State::CheckSum1,
            State::CommandBody => {}
            State::CheckSum1 => self.state = State::CheckSum2,
            State::CheckSum2 => self.state = State::Ready,
        }
        self.buf.push(data);

        if self.buf.len() > self.max_len {
            log::warn!("<-- packet longer than {} bytes dropped", self.max_len);
            self.buf.clear();
            self.state = State::Ready;
            return None;
        }

        if matches!(self.state, State::Ready) {
            match std::str::from_utf8(self.buf.as_slice()) {
                Ok(str) => {
                    log::trace!("<-- {}", str.escape_debug());
                }
                Err(err) => {
                    log::debug!(
                        "<-- INVALID UFT8 PACKET: {}: {:?}",
                        err,
                        self.buf.as_slice()
                    );
                }
            }
            Some(self.buf.as_slice())
        } else {
            None
        }
    }
}

enum PacketStateMachineStates {
    Ready,
    CommandBody,
    CheckSum1,
    CheckSum2,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(psm: &mut PacketStateMachine, data: &[u8]) -> Vec<Vec<u8>> {
        data.iter()
            .filter_map(|b| psm.incomming_data(*b).map(<[u8]>::to_vec))
            .collect()
    }

    #[test]
    fn splits_frames() {
        let mut psm = PacketStateMachine::default();
        let frames = feed(&mut psm, b"+$g#67-\x03junk$m0,4#fd");
        assert_eq!(
            frames,
            vec![
                b"+".to_vec(),
                b"$g#67".to_vec(),
                b"-".to_vec(),
                b"\x03".to_vec(),
                b"$m0,4#fd".to_vec(),
            ]
        );
        assert!(psm.is_idle());
    }

    #[test]
    fn restarts_on_new_start_byte() {
        let mut psm = PacketStateMachine::default();
        let frames = feed(&mut psm, b"$qSupp$?#3f");
        assert_eq!(frames, vec![b"$?#3f".to_vec()]);
    }

    #[test]
    fn oversized_packets_are_dropped() {
        let mut psm = PacketStateMachine::new(8);
        assert!(feed(&mut psm, b"$0123456789#00").is_empty());
        assert_eq!(feed(&mut psm, b"$?#3f"), vec![b"$?#3f".to_vec()]);
    }
}
