// UNSUBACK packet (3.1/3.1.1 section 3.11, 5.0 section 3.11).

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::reason_code::ReasonCode;

pub const UNSUBSCRIBE_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoSubscriptionFound,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
];

pub const UNSUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// Reply to an UNSUBSCRIBE. Carries no payload on 3.1/3.1.1 beyond its
/// packet id; on v5 one reason per filter in the UNSUBSCRIBE, same order
/// [MQTT-3.11.3-1].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason: ReasonCode) -> Self {
        Self { packet_id, properties: Properties::new(), reasons: vec![reason] }
    }

    #[must_use]
    pub fn with_reasons(packet_id: PacketId, reasons: Vec<ReasonCode>) -> Self {
        Self { packet_id, properties: Properties::new(), reasons }
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub fn reasons(&self) -> &[ReasonCode] {
        &self.reasons
    }

    fn remaining_length(&self, protocol_version: ProtocolVersion) -> usize {
        // On 3.1/3.1.1 UNSUBACK carries only the packet id.
        if protocol_version.is_v5() {
            PacketId::bytes() + self.properties.bytes() + self.reasons.len() * ReasonCode::bytes()
        } else {
            PacketId::bytes()
        }
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = FixedHeader::new(
            PacketType::UnsubscribeAck,
            self.remaining_length(protocol_version),
        )?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if protocol_version.is_v5() {
            self.properties.encode(buf)?;
            for reason in &self.reasons {
                reason.encode(buf)?;
            }
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;

        if !protocol_version.is_v5() {
            return Ok(Self { packet_id, properties: Properties::new(), reasons: Vec::new() });
        }

        let mut consumed = PacketId::bytes();
        let properties = Properties::decode(ba)?;
        check_property_type_list(properties.as_slice(), UNSUBSCRIBE_ACK_PROPERTIES)
            .map_err(|_| DecodeError::InvalidPropertyId)?;
        consumed += properties.bytes();

        let mut reasons = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let reason = ReasonCode::decode(ba)?;
            if !UNSUBSCRIBE_ACK_REASONS.contains(&reason) {
                return Err(DecodeError::InvalidReasonCode);
            }
            consumed += ReasonCode::bytes();
            reasons.push(reason);
        }
        if reasons.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        Ok(Self { packet_id, properties, reasons })
    }
}

impl Packet for UnsubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubscribeAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip_is_just_the_packet_id() {
        let packet = UnsubscribeAckPacket::new(PacketId::new(6), ReasonCode::Success);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        assert_eq!(buf, [0xb0, 0x02, 0x00, 0x06]);
    }

    #[test]
    fn v5_roundtrip_with_reasons() {
        let packet = UnsubscribeAckPacket::with_reasons(
            PacketId::new(7),
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionFound],
        );
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reasons(), [ReasonCode::Success, ReasonCode::NoSubscriptionFound]);
    }
}
