use std::fmt::{Debug, Display};
use std::io::ErrorKind;
use std::net::TcpStream;

/// Ordered, reliable byte stream to one GDB client.
pub trait Connection {
    type Error: Debug + Display;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for b in buf {
            self.write(*b)?;
        }
        Ok(())
    }
    fn flush(&mut self) -> Result<(), Self::Error>;
    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_session_end(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    /// Blocks for the next byte, `None` once the peer closed the stream.
    fn read(&mut self) -> Result<Option<u8>, Self::Error>;
    /// Returns the next byte without consuming it or blocking.
    fn peek(&mut self) -> Result<Option<u8>, Self::Error>;

    fn string_repr(&self) -> Option<String> {
        None
    }
}

impl Connection for TcpStream {
    type Error = std::io::Error;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        std::io::Write::write_all(self, &[byte])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        std::io::Write::write_all(self, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(self)
    }

    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        self.set_nodelay(true)
    }

    fn on_session_end(&mut self) -> Result<(), Self::Error> {
        match self.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        self.set_nonblocking(false)?;

        let mut buf = [0u8];
        loop {
            match std::io::Read::read(self, &mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, Self::Error> {
        self.set_nonblocking(true)?;

        let mut buf = [0u8];
        let res = match TcpStream::peek(self, &mut buf) {
            Ok(0) => Err(ErrorKind::UnexpectedEof.into()),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        };
        self.set_nonblocking(false)?;
        res
    }

    fn string_repr(&self) -> Option<String> {
        let local = self.local_addr().ok()?;
        let peer = self.peer_addr().ok()?;
        Some(format!("{{ local: {}, peer: {} }}", local, peer))
    }
}
