pub mod arm_parser;
pub mod standard_parser;

use crate::base::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Sequential little-endian field reader over a packet payload.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    packet: &'static str,
}

impl<'a> FieldReader<'a> {
    pub fn new(packet: &'static str, buf: &'a [u8]) -> FieldReader<'a> {
        FieldReader { buf, pos: 0, packet }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(Error::Protocol {
                description: format!(
                    "{} truncated: need {} bytes, got {}",
                    self.packet,
                    end,
                    self.buf.len()
                ),
            });
        }
        let field = &self.buf[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// A NUL-terminated string. A missing terminator takes the rest of the buffer.
    pub fn c_string(&mut self) -> String {
        let rest = &self.buf[self.pos..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += (len + 1).min(rest.len());
        text
    }
}
