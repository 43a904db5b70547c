use std::cmp::min;
use std::io::{ErrorKind, Read, Write};

/// Fixed-capacity circular byte buffer sitting between a link and the frame
/// decoder.
///
/// Bytes are appended at the tail by [`read_from`](Self::read_from) and
/// consumed from the head with [`skip_bytes`](Self::skip_bytes) once the
/// decoder has looked at them.
///
/// # Example
///
/// ```rust
/// # use std::io::Write;
/// # use p2os::base::RingByteBuffer;
/// let mut buffer = RingByteBuffer::with_capacity(16);
/// buffer.write(&[0xFA, 0xFB, 0x03]).unwrap();
/// assert_eq!(buffer.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RingByteBuffer {
    buf: Vec<u8>,
    head: usize,
    size: usize,
}

impl RingByteBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> RingByteBuffer {
        RingByteBuffer {
            buf: vec![0; capacity],
            head: 0,
            size: 0,
        }
    }

    /// Returns the number of bytes currently stored in the buffer.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the buffer contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn free_space(&self) -> usize {
        self.buf.len() - self.size
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.head = 0;
        self.size = 0;
    }

    fn tail(&self) -> usize {
        (self.head + self.size) % self.buf.len()
    }

    /// The oldest unread bytes, up to the physical end of the storage.
    ///
    /// When the data wraps, the remainder becomes visible after the returned
    /// part has been skipped.
    pub fn current_read_slice(&self) -> &[u8] {
        let end = min(self.head + self.size, self.buf.len());
        &self.buf[self.head..end]
    }

    /// Consumes up to `bytes` bytes from the head, returning how many were dropped.
    pub fn skip_bytes(&mut self, bytes: usize) -> usize {
        let skipped = min(self.size, bytes);
        self.head = (self.head + skipped) % self.buf.len();
        self.size -= skipped;
        skipped
    }

    fn current_write_slice(&mut self) -> &mut [u8] {
        let current_end = self.tail();
        let write_buf_end = min(self.buf.len(), current_end + self.free_space());
        &mut self.buf[current_end..write_buf_end]
    }

    fn mark_bytes_as_written(&mut self, bytes: usize) {
        let written = min(self.free_space(), bytes);
        self.size += written;
    }

    fn partial_read_from<R: Read + ?Sized>(&mut self, upstream: &mut R) -> std::io::Result<usize> {
        if self.current_write_slice().is_empty() {
            return Ok(0);
        }

        match upstream.read(self.current_write_slice()) {
            Ok(read) => {
                self.mark_bytes_as_written(read);
                Ok(read)
            }
            // a read timeout only means "nothing yet"
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Performs a single read from `upstream` into the free space at the tail.
    ///
    /// Only one read is issued so a blocking link returns as soon as any bytes
    /// arrive; space past the storage end is filled by the next call.
    pub fn read_from<R: Read + ?Sized>(&mut self, upstream: &mut R) -> std::io::Result<usize> {
        self.partial_read_from(upstream)
    }
}

impl Read for RingByteBuffer {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut total = 0;
        // two passes cover the wrap-around
        for _ in 0..2 {
            let current_read_slice = self.current_read_slice();
            let read = min(current_read_slice.len(), buf.len() - total);
            buf[total..total + read].clone_from_slice(&current_read_slice[0..read]);
            self.skip_bytes(read);
            total += read;
        }
        Ok(total)
    }
}

impl Write for RingByteBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut total = 0;
        for _ in 0..2 {
            let current_write_slice = self.current_write_slice();
            let written = min(current_write_slice.len(), buf.len() - total);
            current_write_slice[0..written].clone_from_slice(&buf[total..total + written]);
            self.mark_bytes_as_written(written);
            total += written;
        }
        Ok(total)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RingByteBuffer;
    use std::io::{Read, Write};

    #[test]
    fn wraps_around_the_storage_end() {
        let mut buffer = RingByteBuffer::with_capacity(4);
        assert_eq!(buffer.write(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(buffer.skip_bytes(2), 2);
        assert_eq!(buffer.write(&[4, 5, 6]).unwrap(), 3);
        assert_eq!(buffer.free_space(), 0);

        let mut out = [0u8; 4];
        assert_eq!(buffer.read(&mut out).unwrap(), 4);
        assert_eq!(out, [3, 4, 5, 6]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_drops_pending_bytes() {
        let mut buffer = RingByteBuffer::with_capacity(8);
        buffer.write(&[0xFA, 0xFB]).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.current_read_slice().is_empty());
    }
}
