/// The payload of one P2OS packet: the type byte that follows the length byte,
/// and whatever data comes after it (checksum excluded).
///
/// For commands sent to the robot `cmd` is the opcode. For frames received from
/// the robot it is the packet type (a SIP status byte, `ARMPAC`, a sync echo...).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The opcode or packet type.
    pub cmd: u8,

    /// Bytes following the type byte.
    pub data: Vec<u8>,
}

impl Message {
    /// Creates a new message with a command code and no payload.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The command code for the message.
    pub fn new(cmd: u8) -> Message {
        Message::with_data(cmd, &[])
    }

    /// Creates a new message with a command code and payload data.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The command code for the message.
    /// * `data` - A slice containing the payload data.
    #[inline]
    pub fn with_data(cmd: u8, data: &[u8]) -> Message {
        Message {
            cmd,
            data: data.to_vec(),
        }
    }

    /// Number of payload bytes on the wire (type byte included).
    #[inline]
    pub fn payload_len(&self) -> usize {
        1 + self.data.len()
    }
}
