//! GDB Remote Serial Protocol stub.
//!
//! A [`stub::GDBStub`] reads frames from a [`connection::Connection`],
//! dispatches the commands against a [`target::Target`] and writes the
//! replies back. [`mips`] adapts the `mips_emulator` machine as a target.

pub mod connection;
pub mod dispatch;
pub mod exec;
pub mod memory;
pub mod mips;
pub mod packets;
pub mod registers;
pub mod signal;
pub mod stub;
pub mod target;

pub use dispatch::DisconnectReason;
pub use stub::{GDBStub, StubConfig, StubError};
