// PUBREL: second step of the QoS 2 exchange, sent in reply to PUBREC.

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{Packet, PacketType};
use crate::packet::ack::{decode_ack, encode_ack, PacketIdAck};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

pub const PUBLISH_RELEASE_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

pub const PUBLISH_RELEASE_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishReleasePacket(PacketIdAck);

impl PublishReleasePacket {
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
        encode_ack(&self.0, buf, PacketType::PublishRelease, protocol_version)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        if protocol_version.is_v5() {
            decode_ack(
                ba,
                PacketType::PublishRelease,
                PUBLISH_RELEASE_REASONS,
                PUBLISH_RELEASE_PROPERTIES,
            )
            .map(Self)
        } else {
            decode_ack(ba, PacketType::PublishRelease, &[], &[]).map(Self)
        }
    }
}

impl Packet for PublishReleasePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishRelease
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_wire_shape_is_fixed_header_plus_packet_id() {
        let packet = PublishReleasePacket::new(PacketId::new(3));
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        assert_eq!(buf, [0x62, 0x02, 0x00, 0x03]);
    }

    #[test]
    fn v5_roundtrip_with_non_success_reason() {
        let mut packet = PublishReleasePacket::new(PacketId::new(11));
        packet.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishReleasePacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.packet_id(), PacketId::new(11));
        assert_eq!(decoded.reason_code(), ReasonCode::PacketIdentifierNotFound);
    }
}
