// PINGRESP: server's reply to PINGREQ (3.1/3.1.1 section 3.13, 5.0 section
// 3.13). No variable header or payload at any protocol version.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingResponsePacket;

impl PingResponsePacket {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EncodePacket for PingResponsePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        FixedHeader::new(PacketType::PingResponse, 0)?.encode(buf)
    }
}

impl DecodePacket for PingResponsePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PingResponse {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self)
    }
}

impl Packet for PingResponsePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PingResponse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = Vec::new();
        PingResponsePacket::new().encode(&mut buf).unwrap();
        assert_eq!(buf, [0xd0, 0x00]);
        let mut ba = ByteArray::new(&buf);
        PingResponsePacket::decode(&mut ba).unwrap();
    }
}
