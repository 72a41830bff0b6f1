// PINGREQ: client keep-alive heartbeat (3.1/3.1.1 section 3.12, 5.0 section
// 3.12). No variable header or payload at any protocol version.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingRequestPacket;

impl PingRequestPacket {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EncodePacket for PingRequestPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        FixedHeader::new(PacketType::PingRequest, 0)?.encode(buf)
    }
}

impl DecodePacket for PingRequestPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PingRequest {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self)
    }
}

impl Packet for PingRequestPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PingRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = Vec::new();
        PingRequestPacket::new().encode(&mut buf).unwrap();
        assert_eq!(buf, [0xc0, 0x00]);
        let mut ba = ByteArray::new(&buf);
        PingRequestPacket::decode(&mut ba).unwrap();
    }
}
