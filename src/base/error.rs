use std::io;
use std::net::SocketAddr;

/// Failure to build an outgoing command frame.
///
/// Callers validate setpoints before building frames, so hitting one of these
/// is a defect in the caller rather than a link condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// The argument does not fit the declared argument type.
    #[error("argument {value} out of range for {arg_type:?} (opcode {opcode})")]
    ArgumentOutOfRange {
        opcode: u8,
        arg_type: crate::cmds::ArgType,
        value: i32,
    },

    /// The payload would not fit in a single P2OS packet.
    #[error("payload of {0} bytes exceeds the maximum packet size")]
    PayloadTooLarge(usize),
}

/// Failure to obtain a valid frame from the byte stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// No complete frame arrived before the deadline.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// Bytes that do not start a frame were discarded.
    #[error("bad sync: discarded {discarded} bytes")]
    BadSync { discarded: usize },

    /// The length byte cannot describe a valid frame.
    #[error("invalid frame length {0}")]
    BadLength(u8),

    /// The trailing checksum does not match the payload.
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

impl DecodeError {
    /// Whether the error only cost one frame and reading may simply continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::Timeout)
    }
}

/// Failure to open the serial device or reach the TCP bridge.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Missing device, permission denied or an unsupported port setting.
    #[error("cannot open serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// DNS resolution yielded no address.
    #[error("cannot resolve host {host}")]
    Resolve { host: String },

    #[error("connection refused by {addr}")]
    Refused { addr: SocketAddr },

    #[error("no route to host {addr}")]
    Unreachable { addr: SocketAddr },

    #[error("cannot connect to {addr}: {source}")]
    Failed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Represents errors that can occur while driving a P2OS robot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// The handshake never reached `Ready`.
    #[error("could not synchronize with the robot after {attempts} round trips")]
    SyncFailed { attempts: usize },

    /// The per-cycle receive failed once the link was up.
    #[error("link lost: {0}")]
    LinkLost(DecodeError),

    /// A frame was valid on the wire but its contents were not.
    #[error("protocol error: {description}")]
    Protocol { description: String },

    /// The device was already shut down.
    #[error("device is not connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// A specialized `Result` type for P2OS operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_is_unrecoverable() {
        assert!(!DecodeError::Timeout.is_recoverable());
        assert!(DecodeError::BadSync { discarded: 3 }.is_recoverable());
        assert!(DecodeError::BadLength(1).is_recoverable());
        assert!(DecodeError::ChecksumMismatch {
            expected: 1,
            actual: 2
        }
        .is_recoverable());
    }
}
