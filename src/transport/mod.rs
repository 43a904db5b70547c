//! Byte links to the robot controller: a serial line or a TCP bridge.

use crate::base::Result;
use std::io::{Read, Write};
use std::time::Duration;

mod serial;
mod tcp;

#[cfg(test)]
pub(crate) mod mock;

pub use serial::SerialLink;
pub use tcp::TcpLink;

/// A duplex byte stream plus the knobs the handshake needs.
///
/// Reads block for at most the configured read timeout and report an
/// expired timeout as `ErrorKind::TimedOut`.
pub trait Link: Read + Write + Send {
    /// `None` blocks until data arrives.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Switches the line speed. A no-op on links without one.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Whether trying several baud rates makes sense on this link.
    fn supports_baud_rate(&self) -> bool;

    /// Discards everything received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;
}
