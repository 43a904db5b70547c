use crate::base::error::{DecodeError, Result};
use crate::base::message::Message;
use std::io;

/// Outcome of feeding bytes to a [`ProtocolDecoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStep {
    /// All bytes were consumed but no frame is complete yet.
    NeedMore,
    /// A complete, validated frame.
    Frame(Message),
    /// The consumed bytes were discarded as malformed.
    Rejected(DecodeError),
}

/// Defines the behavior for decoding byte streams into `Message` objects.
pub trait ProtocolDecoder {
    /// Feeds the decoder with `buf`.
    ///
    /// Returns the number of bytes consumed and what they produced. Consumed
    /// bytes must not be offered again; a `Rejected` step has already
    /// discarded the malformed bytes it reports.
    fn decode(&mut self, buf: &[u8]) -> (usize, DecodeStep);

    /// Resets the internal state of the decoder.
    /// This is typically called after a communication error or when starting a new session.
    fn reset_decoder(&mut self);
}

/// Defines the behavior for encoding `Message` objects into byte streams.
pub trait ProtocolEncoder {
    /// Encodes a `Message` into the provided byte buffer.
    ///
    /// Returns the number of bytes written to the buffer upon successful encoding.
    fn encode(&mut self, msg: &Message, bytes: &mut [u8]) -> Result<usize>;

    /// Estimates the maximum size in bytes required to encode the given `Message`.
    fn estimate_encoded_size(&mut self, msg: &Message) -> Result<usize>;

    /// Encodes a `Message` and writes it directly to a `Write` target (e.g., a serial port).
    ///
    /// Returns the number of bytes successfully written to the destination.
    fn write_to(&mut self, msg: &Message, dest: &mut impl io::Write) -> Result<usize>;

    /// Resets the internal state of the encoder.
    fn reset_encoder(&mut self);
}
