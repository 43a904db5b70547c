use crate::base::error::{DecodeError, Error, Result};
use crate::base::message::Message;
use crate::base::ring_byte_buffer::RingByteBuffer;
use crate::base::traits::{DecodeStep, ProtocolDecoder, ProtocolEncoder};
use log::{error, trace, warn};
use std::io;
use std::time::{Duration, Instant};

const DEFAULT_CHANNEL_READ_BUFFER_SIZE: usize = 1024;

/// Pause after a read that produced nothing, for streams that return
/// immediately instead of blocking.
const IDLE_READ_BACKOFF: Duration = Duration::from_millis(1);

/// Channel encodes and decodes messages with a protocol, and sends and
/// receives the bytes through a stream.
///
/// The stream's own read timeout bounds how long a single read may block;
/// the deadlines passed to [`read_until`](Self::read_until) and
/// [`receive`](Self::receive) are checked between reads.
///
/// # Examples
/// ```ignore
/// let mut channel = Channel::new(P2osHostProtocol::new(), link);
/// channel.write(&Message::new(P2OS_SYNC0)).unwrap();
/// ```
#[derive(Debug)]
pub struct Channel<P, T: ?Sized> {
    protocol: P,
    stream: Box<T>,
    read_buffer: RingByteBuffer,
}

impl<P, T: ?Sized> Channel<P, T>
where
    P: ProtocolDecoder + ProtocolEncoder,
    T: io::Read + io::Write,
{
    /// Create a new `Channel` to read and write messages
    pub fn new(protocol: P, stream: Box<T>) -> Channel<P, T> {
        Channel::with_read_buffer_size(protocol, stream, DEFAULT_CHANNEL_READ_BUFFER_SIZE)
    }

    /// Create a new `Channel` with non-default ring buffer capacity
    pub fn with_read_buffer_size(
        protocol: P,
        stream: Box<T>,
        read_buffer_size: usize,
    ) -> Channel<P, T> {
        trace!("Creating new Channel with buffer size {}", read_buffer_size);
        let mut chn = Channel {
            protocol,
            stream,
            read_buffer: RingByteBuffer::with_capacity(read_buffer_size),
        };

        chn.reset();
        chn
    }

    /// Reset the channel status.
    ///
    /// Drops buffered bytes and any partially decoded frame. Usually called
    /// after a communication error or when the link parameters change.
    pub fn reset(&mut self) {
        trace!("Resetting Channel protocol state and read buffer");
        self.protocol.reset_encoder();
        self.protocol.reset_decoder();
        self.read_buffer.clear();
    }

    /// The underlying stream, for link-level settings such as timeouts.
    pub fn stream_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Feeds buffered bytes to the decoder until a frame or rejection comes
    /// out or the buffer runs dry.
    fn decode_buffered(&mut self) -> Option<DecodeStep> {
        while !self.read_buffer.is_empty() {
            let (consumed, step) = self.protocol.decode(self.read_buffer.current_read_slice());
            self.read_buffer.skip_bytes(consumed);
            trace!(
                "Decoder consumed {} bytes ({} left in buffer)",
                consumed,
                self.read_buffer.len()
            );
            match step {
                DecodeStep::NeedMore if consumed == 0 => {
                    error!("Decoder made no progress, resetting");
                    self.protocol.reset_decoder();
                    self.read_buffer.clear();
                    return None;
                }
                DecodeStep::NeedMore => continue,
                other => return Some(other),
            }
        }
        None
    }

    /// Read one frame, giving up when `timeout` has elapsed.
    ///
    /// Returns `Err(Error::Decode(DecodeError::Timeout))` when no frame
    /// completes in time, and the rejection itself when malformed bytes were
    /// discarded.
    ///
    /// # Example
    /// ```ignore
    /// let msg = channel.read_until(Duration::from_millis(200))?;
    /// ```
    pub fn read_until(&mut self, timeout: Duration) -> Result<Message> {
        let start = Instant::now();

        loop {
            match self.decode_buffered() {
                Some(DecodeStep::Frame(msg)) => {
                    trace!(
                        "Decoded message: type={:02X}, data_len={}",
                        msg.cmd,
                        msg.data.len()
                    );
                    return Ok(msg);
                }
                Some(DecodeStep::Rejected(err)) => return Err(err.into()),
                Some(DecodeStep::NeedMore) | None => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                trace!("Read deadline reached after {:?}", elapsed);
                return Err(DecodeError::Timeout.into());
            }

            match self.read_buffer.read_from(&mut self.stream) {
                Ok(0) => {
                    trace!("Stream read returned no data");
                    std::thread::sleep(IDLE_READ_BACKOFF.min(timeout - elapsed));
                }
                Ok(bytes_read) => trace!(
                    "Read {} bytes from stream (buffer len: {})",
                    bytes_read,
                    self.read_buffer.len()
                ),
                Err(e) => {
                    error!("IO error reading from stream: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Read one frame, skipping over frames the decoder had to reject.
    ///
    /// Only the deadline and I/O failures end the wait.
    pub fn receive(&mut self, timeout: Duration) -> Result<Message> {
        let start = Instant::now();
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            match self.read_until(remaining) {
                Err(Error::Decode(err)) if err.is_recoverable() => {
                    warn!("Discarding malformed input: {}", err);
                }
                result => return result,
            }
        }
    }

    /// Write message to channel
    ///
    /// # Example
    /// ```ignore
    /// channel.write(&Message::new(P2OS_CMD_PULSE))?;
    /// ```
    pub fn write(&mut self, msg: &Message) -> Result<usize> {
        trace!(
            "Channel write: cmd={}, data_len={}",
            msg.cmd,
            msg.data.len()
        );
        let written = self.protocol.write_to(msg, &mut self.stream)?;
        self.stream.flush()?;
        Ok(written)
    }

    /// Send a request to channel and wait for the next frame
    ///
    /// # Example
    /// ```ignore
    /// let echo = channel.invoke(&Message::new(P2OS_SYNC0), Duration::from_millis(200))?;
    /// ```
    pub fn invoke(&mut self, request: &Message, timeout: Duration) -> Result<Message> {
        if let Err(e) = self.write(request) {
            error!("Failed to write request {}: {}", request.cmd, e);
            return Err(e);
        }
        self.receive(timeout)
    }
}
