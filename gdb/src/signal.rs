/// Signal numbers as GDB expects them on the wire, independent of the host.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    SIGZERO = 0,
    SIGHUP = 1,
    SIGINT = 2,
    SIGQUIT = 3,
    SIGILL = 4,
    SIGTRAP = 5,
    SIGABRT = 6,
    SIGEMT = 7,
    SIGFPE = 8,
    SIGKILL = 9,
    SIGBUS = 10,
    SIGSEGV = 11,
    SIGSYS = 12,
    SIGPIPE = 13,
    SIGALRM = 14,
    SIGTERM = 15,
}

impl Signal {
    pub fn from_protocol_u8(val: u8) -> Option<Self> {
        use Signal::*;
        Some(match val {
            0 => SIGZERO,
            1 => SIGHUP,
            2 => SIGINT,
            3 => SIGQUIT,
            4 => SIGILL,
            5 => SIGTRAP,
            6 => SIGABRT,
            7 => SIGEMT,
            8 => SIGFPE,
            9 => SIGKILL,
            10 => SIGBUS,
            11 => SIGSEGV,
            12 => SIGSYS,
            13 => SIGPIPE,
            14 => SIGALRM,
            15 => SIGTERM,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}
