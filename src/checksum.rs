/// Calculates the 16-bit checksum carried at the end of every P2OS packet.
///
/// Payload bytes are summed as big-endian 16-bit words, truncated to 16 bits
/// after each addition. An odd trailing byte is XORed into the low byte.
/// The sync bytes and the length byte are not covered.
pub struct Checksum {
    current: u16,
    pending: Option<u8>,
}

impl Checksum {
    /// Creates a new `Checksum` instance, initialized to 0.
    #[inline]
    pub fn new() -> Checksum {
        Checksum {
            current: 0,
            pending: None,
        }
    }

    /// Includes a slice of bytes in the checksum calculation.
    ///
    /// Slices may be pushed in pieces; word pairing carries over between calls.
    pub fn push_slice(&mut self, data: &[u8]) {
        for &d in data {
            match self.pending.take() {
                Some(high) => {
                    let word = u16::from(high) << 8 | u16::from(d);
                    self.current = self.current.wrapping_add(word);
                }
                None => self.pending = Some(d),
            }
        }
    }

    /// Returns the calculated checksum value.
    #[inline]
    pub fn checksum(&self) -> u16 {
        match self.pending {
            Some(odd) => self.current ^ u16::from(odd),
            None => self.current,
        }
    }

    /// Checksum of a complete payload.
    #[inline]
    pub fn of(data: &[u8]) -> u16 {
        let mut checksum = Checksum::new();
        checksum.push_slice(data);
        checksum.checksum()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}
