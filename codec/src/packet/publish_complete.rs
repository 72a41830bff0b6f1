// PUBCOMP: final step of the QoS 2 exchange, sent in reply to PUBREL.

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{Packet, PacketType};
use crate::packet::ack::{decode_ack, encode_ack, PacketIdAck};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

pub const PUBLISH_COMPLETE_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

pub const PUBLISH_COMPLETE_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishCompletePacket(PacketIdAck);

impl PublishCompletePacket {
    #[must_use]
    pub fn new(packet_id: PacketId) -> Self {
        Self(PacketIdAck::new(packet_id))
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.0.packet_id()
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.0.set_reason_code(reason_code);
        self
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.0.reason_code()
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        self.0.properties()
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        self.0.mut_properties()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        encode_ack(&self.0, buf, PacketType::PublishComplete, protocol_version)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        if protocol_version.is_v5() {
            decode_ack(
                ba,
                PacketType::PublishComplete,
                PUBLISH_COMPLETE_REASONS,
                PUBLISH_COMPLETE_PROPERTIES,
            )
            .map(Self)
        } else {
            decode_ack(ba, PacketType::PublishComplete, &[], &[]).map(Self)
        }
    }
}

impl Packet for PublishCompletePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip() {
        let packet = PublishCompletePacket::new(PacketId::new(42));
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded =
            PublishCompletePacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert_eq!(decoded.packet_id(), PacketId::new(42));
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }

    #[test]
    fn v5_roundtrip_with_reason_and_properties() {
        let mut packet = PublishCompletePacket::new(PacketId::new(5));
        packet.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishCompletePacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::PacketIdentifierNotFound);
    }
}
