use std::str::Utf8Error;

use thiserror::Error;

use super::hex::{parse_hex, HexError};

/// Thread ids as they appear in `H` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadId {
    /// `-1`
    All,
    /// `0`
    Any,
    Id(u32),
}

impl ThreadId {
    fn parse(arg: &str) -> Result<Self, CommandParseError> {
        Ok(match arg {
            "-1" => ThreadId::All,
            "0" => ThreadId::Any,
            id => ThreadId::Id(parse_hex(id)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOp {
    /// `Hg`, used for register and memory access.
    General,
    /// `Hc`, used for step and continue.
    Continue,
    /// `Hm`
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Command {
    ContinueAt(Option<u32>),
    StepAt(Option<u32>),
    ContinueAtSignal(u8, Option<u32>),
    StepAtSignal(u8, Option<u32>),

    ReadRegisters,
    WriteRegisters(String),
    ReadRegister(usize),
    WriteRegister(usize, String),

    ReadMemory { addr: u32, len: u32 },
    WriteMemory { addr: u32, len: u32, data: String },

    InsertSoftwareBreakpoint { addr: u32, kind: u8 },
    RemoveSoftwareBreakpoint { addr: u32, kind: u8 },

    MustReplyEmpty,
    ExceptionReason,
    Kill,
    Detach,

    qSupported(Vec<(String, bool, Option<String>)>),
    qTStatus,
    qTfV,
    qTfP,
    qfThreadInfo,
    qsThreadInfo,
    qC,
    qAttached,

    SelectThread(ThreadOp, ThreadId),

    Unsupported(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("packet is not utf8: {0}")]
    InvalidUFT8(#[from] Utf8Error),
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error("malformed command {0:?}")]
    MalformedCommand(String),
}

fn split<'a>(args: &'a str, sep: char) -> Result<(&'a str, &'a str), CommandParseError> {
    args.split_once(sep)
        .ok_or_else(|| CommandParseError::MalformedCommand(args.into()))
}

fn optional_addr(arg: &str) -> Result<Option<u32>, CommandParseError> {
    if arg.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parse_hex(arg)?))
    }
}

/// `<sig>[;<addr>]` as used by `C` and `S`.
fn signal_and_addr(arg: &str) -> Result<(u8, Option<u32>), CommandParseError> {
    let (sig, addr) = match arg.split_once(';') {
        Some((sig, addr)) => (sig, Some(parse_hex(addr)?)),
        None => (arg, None),
    };
    Ok((parse_hex(sig)?, addr))
}

/// `<addr>,<kind>[;<cond list>]` as used by `Z0` and `z0`.
fn breakpoint(args: &str) -> Result<(u32, u8), CommandParseError> {
    let (addr, kind) = split(args, ',')?;
    let kind = kind.split(';').next().unwrap_or(kind);
    Ok((parse_hex(addr)?, parse_hex(kind)?))
}

fn supported_features(raw_args: &str) -> Vec<(String, bool, Option<String>)> {
    let mut args = Vec::new();
    for arg in raw_args.split(';').filter(|a| !a.is_empty()) {
        if let Some(arg) = arg.strip_suffix('+') {
            args.push((arg.into(), true, None));
        } else if let Some(arg) = arg.strip_suffix('-') {
            args.push((arg.into(), false, None));
        } else if let Some((key, val)) = arg.split_once('=') {
            args.push((key.into(), true, Some(val.into())))
        } else {
            args.push((arg.into(), true, None));
        }
    }
    args
}

impl Command {
    /// Parses an unescaped packet payload.
    ///
    /// Exact matches are tried before prefixes, longer prefixes before
    /// shorter ones. Anything without a match becomes [`Command::Unsupported`].
    pub fn from_payload(buf: &[u8]) -> Result<Self, CommandParseError> {
        macro_rules! create_command {
            ($command:ident $s:literal => $b:expr, $($tt:tt)*) => {
                if $command == $s {
                    $b
                } else {
                    create_command!($command $($tt)*)
                }
            };
            ($command:ident $s:literal = $a:ident => $b:expr, $($tt:tt)*) => {
                if let Some($a) = $command.strip_prefix($s) {
                    $b
                } else {
                    create_command!($command $($tt)*)
                }
            };
            ($command:ident) => {{
                log::debug!("unreconized command: {:?}", $command);
                Command::Unsupported($command.into())
            }};
        }

        let command = std::str::from_utf8(buf)?;

        Ok(create_command!(command
            "?" => Command::ExceptionReason,
            "g" => Command::ReadRegisters,
            "k" => Command::Kill,
            "D" => Command::Detach,
            "c" => Command::ContinueAt(None),
            "s" => Command::StepAt(None),

            "vMustReplyEmpty" => Command::MustReplyEmpty,
            "qSupported" => Command::qSupported(Vec::new()),
            "qTStatus" => Command::qTStatus,
            "qTfV" => Command::qTfV,
            "qTfP" => Command::qTfP,
            "qfThreadInfo" => Command::qfThreadInfo,
            "qsThreadInfo" => Command::qsThreadInfo,
            "qC" => Command::qC,
            "qAttached" => Command::qAttached,

            "qSupported:" = raw_args => Command::qSupported(supported_features(raw_args)),
            "qAttached:" = _pid => Command::qAttached,
            "D;" = _pid => Command::Detach,

            "Hg" = arg => Command::SelectThread(ThreadOp::General, ThreadId::parse(arg)?),
            "Hc" = arg => Command::SelectThread(ThreadOp::Continue, ThreadId::parse(arg)?),
            "Hm" = arg => Command::SelectThread(ThreadOp::Memory, ThreadId::parse(arg)?),

            "Z0," = args => {
                let (addr, kind) = breakpoint(args)?;
                Command::InsertSoftwareBreakpoint { addr, kind }
            },
            "z0," = args => {
                let (addr, kind) = breakpoint(args)?;
                Command::RemoveSoftwareBreakpoint { addr, kind }
            },

            'G' = args => Command::WriteRegisters(args.into()),
            'p' = args => Command::ReadRegister(parse_hex(args)?),
            'P' = args => {
                let (reg, value) = split(args, '=')?;
                Command::WriteRegister(parse_hex(reg)?, value.into())
            },

            'm' = args => {
                let (addr, len) = split(args, ',')?;
                Command::ReadMemory { addr: parse_hex(addr)?, len: parse_hex(len)? }
            },
            'M' = args => {
                let (addr, tmp) = split(args, ',')?;
                let (len, data) = split(tmp, ':')?;
                Command::WriteMemory { addr: parse_hex(addr)?, len: parse_hex(len)?, data: data.into() }
            },

            'c' = arg => Command::ContinueAt(optional_addr(arg)?),
            's' = arg => Command::StepAt(optional_addr(arg)?),
            'C' = arg => {
                let (sig, addr) = signal_and_addr(arg)?;
                Command::ContinueAtSignal(sig, addr)
            },
            'S' = arg => {
                let (sig, addr) = signal_and_addr(arg)?;
                Command::StepAtSignal(sig, addr)
            },
        ))
    }
}
