use crate::base::{
    DecodeError, DecodeStep, EncodeError, Error, Message, ProtocolDecoder, ProtocolEncoder, Result,
};
use crate::checksum::Checksum;
use byteorder::{BigEndian, ByteOrder};
use log::{error, trace};
use std::cmp::min;
use std::io::Write;

const P2OS_SYNC_BYTES: [u8; 2] = [0xFA, 0xFB];

/// Upper bound for a whole packet: sync, length, payload and checksum.
pub const P2OS_MAX_PACKET_SIZE: usize = 256;

/// Sync bytes plus the length byte.
const P2OS_HEADER_SIZE: usize = 3;

const P2OS_CHECKSUM_SIZE: usize = 2;

/// Largest payload (type byte included) a single packet can carry.
pub const P2OS_MAX_PAYLOAD_SIZE: usize =
    P2OS_MAX_PACKET_SIZE - P2OS_HEADER_SIZE - P2OS_CHECKSUM_SIZE;

#[derive(Debug, Clone, PartialEq)]
enum DecodeStatus {
    WaitSyncByte(usize),
    WaitLength,
    ReceiveBody(usize),
}

/// The P2OS packet framing in both directions.
///
/// Every packet is `FA FB`, a length byte counting the payload and the
/// checksum, the payload, then the checksum high byte first. The payload's
/// first byte is the opcode or packet type.
#[derive(Debug, Clone, PartialEq)]
pub struct P2osHostProtocol {
    status: DecodeStatus,
    body: Vec<u8>,
    discarded: usize,
}

impl P2osHostProtocol {
    /// Creates a new `P2osHostProtocol` instance in its initial state.
    pub fn new() -> P2osHostProtocol {
        P2osHostProtocol {
            status: DecodeStatus::WaitSyncByte(0),
            body: Vec::with_capacity(P2OS_MAX_PACKET_SIZE),
            discarded: 0,
        }
    }

    fn start_wait_sync_bytes(&mut self, sync_byte_index: usize) {
        self.status = DecodeStatus::WaitSyncByte(sync_byte_index);
        self.body.clear();
    }

    /// Consumes one byte while hunting for the sync pair. Returns a rejection
    /// once a sync pair completes after garbage.
    fn decode_sync_byte(&mut self, byte: u8, i: usize) -> Option<DecodeError> {
        if byte == P2OS_SYNC_BYTES[i] {
            if i + 1 < P2OS_SYNC_BYTES.len() {
                self.status = DecodeStatus::WaitSyncByte(i + 1);
                return None;
            }
            self.status = DecodeStatus::WaitLength;
            if self.discarded > 0 {
                let discarded = self.discarded;
                self.discarded = 0;
                return Some(DecodeError::BadSync { discarded });
            }
            return None;
        }

        // the partial sync counts as garbage too
        self.discarded += i;
        if byte == P2OS_SYNC_BYTES[0] {
            self.start_wait_sync_bytes(1);
        } else {
            self.discarded += 1;
            self.start_wait_sync_bytes(0);
        }
        None
    }

    fn decode_length(&mut self, length: u8) -> Option<DecodeError> {
        let length_usize = length as usize;
        if length_usize < P2OS_CHECKSUM_SIZE + 1
            || length_usize > P2OS_MAX_PACKET_SIZE - P2OS_HEADER_SIZE
        {
            trace!("Rejecting frame length {}", length);
            self.start_wait_sync_bytes(0);
            return Some(DecodeError::BadLength(length));
        }
        trace!("Frame length {}, receiving body", length);
        self.body.clear();
        self.status = DecodeStatus::ReceiveBody(length_usize);
        None
    }

    fn finish_body(&mut self) -> DecodeStep {
        let split = self.body.len() - P2OS_CHECKSUM_SIZE;
        let (payload, trailer) = self.body.split_at(split);
        let expected = Checksum::of(payload);
        let actual = BigEndian::read_u16(trailer);
        let step = if expected == actual {
            DecodeStep::Frame(Message::with_data(payload[0], &payload[1..]))
        } else {
            trace!(
                "Checksum mismatch: computed {:04X}, received {:04X}",
                expected,
                actual
            );
            DecodeStep::Rejected(DecodeError::ChecksumMismatch { expected, actual })
        };
        self.start_wait_sync_bytes(0);
        step
    }
}

impl Default for P2osHostProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDecoder for P2osHostProtocol {
    /// Decodes bytes according to the P2OS framing.
    ///
    /// Garbage ahead of a sync pair is reported as a single `BadSync` once the
    /// pair is found. Partial frames are kept across calls, so every byte
    /// offered is consumed unless a frame or rejection ends the call early.
    fn decode(&mut self, buf: &[u8]) -> (usize, DecodeStep) {
        let mut i = 0;
        while i < buf.len() {
            match self.status {
                DecodeStatus::WaitSyncByte(sync_index) => {
                    let rejection = self.decode_sync_byte(buf[i], sync_index);
                    i += 1;
                    if let Some(err) = rejection {
                        return (i, DecodeStep::Rejected(err));
                    }
                }
                DecodeStatus::WaitLength => {
                    let rejection = self.decode_length(buf[i]);
                    i += 1;
                    if let Some(err) = rejection {
                        return (i, DecodeStep::Rejected(err));
                    }
                }
                DecodeStatus::ReceiveBody(length) => {
                    let wanted = length - self.body.len();
                    let take = min(wanted, buf.len() - i);
                    self.body.extend_from_slice(&buf[i..i + take]);
                    i += take;
                    if self.body.len() == length {
                        return (i, self.finish_body());
                    }
                }
            }
        }
        (i, DecodeStep::NeedMore)
    }

    fn reset_decoder(&mut self) {
        trace!("Resetting decoder state");
        self.discarded = 0;
        self.start_wait_sync_bytes(0);
    }
}

impl ProtocolEncoder for P2osHostProtocol {
    /// Encodes a command `Message` into the provided byte buffer.
    fn encode(&mut self, msg: &Message, bytes: &mut [u8]) -> Result<usize> {
        let total_len = self.estimate_encoded_size(msg)?;
        if total_len > bytes.len() {
            error!(
                "Buffer too small: required {}, available {}",
                total_len,
                bytes.len()
            );
            return Err(Error::Protocol {
                description: format!("encode buffer too small for {} bytes", total_len),
            });
        }

        let payload_len = msg.payload_len();
        let payload_end = P2OS_HEADER_SIZE + payload_len;
        bytes[..2].copy_from_slice(&P2OS_SYNC_BYTES);
        bytes[2] = (payload_len + P2OS_CHECKSUM_SIZE) as u8;
        bytes[3] = msg.cmd;
        bytes[4..payload_end].copy_from_slice(&msg.data);

        let checksum = Checksum::of(&bytes[P2OS_HEADER_SIZE..payload_end]);
        BigEndian::write_u16(&mut bytes[payload_end..total_len], checksum);
        trace!("Encoded packet: {:02X?}", &bytes[..total_len]);
        Ok(total_len)
    }

    fn estimate_encoded_size(&mut self, msg: &Message) -> Result<usize> {
        let payload_len = msg.payload_len();
        if payload_len > P2OS_MAX_PAYLOAD_SIZE {
            return Err(EncodeError::PayloadTooLarge(payload_len).into());
        }
        Ok(P2OS_HEADER_SIZE + payload_len + P2OS_CHECKSUM_SIZE)
    }

    /// Encodes a command `Message` and writes it directly to a `Write` target.
    fn write_to(&mut self, msg: &Message, dest: &mut impl Write) -> Result<usize> {
        let mut buf = [0u8; P2OS_MAX_PACKET_SIZE];
        let encoded_size = self.encode(msg, &mut buf)?;
        match dest.write_all(&buf[..encoded_size]) {
            Ok(()) => Ok(encoded_size),
            Err(err) => {
                error!("IO error during write_all: {}", err);
                Err(err.into())
            }
        }
    }

    fn reset_encoder(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: ProtocolEncoder>(protocol: &mut T, msg: &Message) -> Result<Vec<u8>> {
        let encoded_bytes = protocol.estimate_encoded_size(msg)?;
        let mut buf = vec![0; encoded_bytes];
        let encoded_bytes = protocol.encode(msg, &mut buf[0..encoded_bytes])?;
        buf.truncate(encoded_bytes);
        Ok(buf)
    }

    #[test]
    fn protocol_encode() {
        let mut protocol = P2osHostProtocol::new();

        assert_eq!(
            encode(&mut protocol, &Message::new(0)).unwrap(),
            [0xFA, 0xFB, 0x03, 0x00, 0x00, 0x00]
        );

        // ENABLE 1
        assert_eq!(
            encode(&mut protocol, &Message::with_data(0x04, &[0x3B, 0x01, 0x00])).unwrap(),
            [0xFA, 0xFB, 0x06, 0x04, 0x3B, 0x01, 0x00, 0x05, 0x3B]
        );
    }

    #[test]
    fn protocol_encode_rejects_oversized_payload() {
        let mut protocol = P2osHostProtocol::new();
        let msg = Message::with_data(0x30, &[0; P2OS_MAX_PAYLOAD_SIZE]);
        match encode(&mut protocol, &msg) {
            Err(Error::Encode(EncodeError::PayloadTooLarge(len))) => {
                assert_eq!(len, P2OS_MAX_PAYLOAD_SIZE + 1)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn protocol_decode_across_calls() {
        let mut protocol = P2osHostProtocol::new();
        let packet = [0xFA, 0xFB, 0x06, 0x04, 0x3B, 0x01, 0x00, 0x05, 0x3B];

        assert_eq!(protocol.decode(&packet[..4]), (4, DecodeStep::NeedMore));
        assert_eq!(
            protocol.decode(&packet[4..]),
            (
                5,
                DecodeStep::Frame(Message::with_data(0x04, &[0x3B, 0x01, 0x00]))
            )
        );
    }

    #[test]
    fn protocol_decode_reports_garbage_once() {
        let mut protocol = P2osHostProtocol::new();
        let input = [0x01, 0xFA, 0x02, 0xFA, 0xFA, 0xFB, 0x03, 0x02, 0x00, 0x02];

        let (consumed, step) = protocol.decode(&input);
        assert_eq!(step, DecodeStep::Rejected(DecodeError::BadSync { discarded: 4 }));
        assert_eq!(
            protocol.decode(&input[consumed..]),
            (4, DecodeStep::Frame(Message::new(2)))
        );
    }

    #[test]
    fn protocol_decode_detects_corruption() {
        let mut protocol = P2osHostProtocol::new();
        let mut packet = [0xFA, 0xFB, 0x06, 0x04, 0x3B, 0x01, 0x00, 0x05, 0x3B];
        packet[5] ^= 0x10;
        assert_eq!(
            protocol.decode(&packet),
            (
                9,
                DecodeStep::Rejected(DecodeError::ChecksumMismatch {
                    expected: 0x153B,
                    actual: 0x053B
                })
            )
        );

        assert_eq!(
            protocol.decode(&[0xFA, 0xFB, 0x02]),
            (3, DecodeStep::Rejected(DecodeError::BadLength(2)))
        );
    }
}
