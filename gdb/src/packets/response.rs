use std::fmt::Debug;

use crate::signal::Signal;

use super::hex::encode_hex;

/// Errno style value sent back as `E<nn>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// Arguments could not be decoded.
    pub const DECODE: ErrorCode = ErrorCode(0x01);
    /// Memory outside of what the target can access (EFAULT).
    pub const OUT_OF_RANGE: ErrorCode = ErrorCode(0x0e);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Empty,
    Ok,
    Data(String),
    /// Acknowledge the packet but send nothing back.
    Silent,
}

/// What the dispatcher wants written for a command.
///
/// `None` means the command is not supported.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    pack: Option<Result<Reply, ErrorCode>>,
}

impl Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pack {
            Some(Ok(ok)) => f.debug_struct("Response").field("pack", ok).finish(),
            Some(Err(err)) => f
                .debug_struct("Response - err")
                .field("err_id", &err.0)
                .finish(),
            None => f.debug_struct("Response - none").finish(),
        }
    }
}

impl Response {
    pub const EMPTY: Response = Response {
        pack: Some(Ok(Reply::Empty)),
    };
    pub const OK: Response = Response {
        pack: Some(Ok(Reply::Ok)),
    };
    pub const SILENT: Response = Response {
        pack: Some(Ok(Reply::Silent)),
    };
    pub const NO_REPLY: Response = Response { pack: None };

    pub fn err(code: ErrorCode) -> Self {
        Self {
            pack: Some(Err(code)),
        }
    }

    pub fn ok_string(str: impl Into<String>) -> Self {
        Self {
            pack: Some(Ok(Reply::Data(str.into()))),
        }
    }

    pub fn hex(data: &[u8]) -> Self {
        Self::ok_string(encode_hex(data))
    }

    pub fn stop(signal: Signal) -> Self {
        Self::ok_string(format!("S{:02x}", signal as u8))
    }

    pub fn is_supported(&self) -> bool {
        self.pack.is_some()
    }

    /// Payload bytes to frame, `None` when no packet should be sent.
    pub fn payload(&self) -> Option<Vec<u8>> {
        match self.pack.as_ref()? {
            Ok(Reply::Empty) => Some(Vec::new()),
            Ok(Reply::Ok) => Some(b"OK".to_vec()),
            Ok(Reply::Data(data)) => Some(data.as_bytes().to_vec()),
            Ok(Reply::Silent) => None,
            Err(ErrorCode(code)) => Some(format!("E{:02x}", code).into_bytes()),
        }
    }
}
