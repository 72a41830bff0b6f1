// SUBACK packet (3.1/3.1.1 section 3.9, 5.0 section 3.9).

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::reason_code::ReasonCode;

/// On 3.1/3.1.1 the wire value is one of the first three of these (0, 1, 2)
/// plus the 0x80 failure code; 5.0 uses the full table.
pub const SUBSCRIBE_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQoS1,
    ReasonCode::GrantedQoS2,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

pub const SUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// Reply to a SUBSCRIBE. The payload carries one reason per topic filter in
/// the SUBSCRIBE, in the same order [MQTT-3.9.3-1].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
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

    pub fn mut_reasons(&mut self) -> &mut Vec<ReasonCode> {
        &mut self.reasons
    }

    fn remaining_length(&self, protocol_version: ProtocolVersion) -> usize {
        let mut len = PacketId::bytes();
        if protocol_version.is_v5() {
            len += self.properties.bytes();
        }
        len + self.reasons.len() * ReasonCode::bytes()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header =
            FixedHeader::new(PacketType::SubscribeAck, self.remaining_length(protocol_version))?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        for reason in &self.reasons {
            reason.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;

        let mut consumed = PacketId::bytes();
        let properties = if protocol_version.is_v5() {
            let properties = Properties::decode(ba)?;
            check_property_type_list(properties.as_slice(), SUBSCRIBE_ACK_PROPERTIES)
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            consumed += properties.bytes();
            properties
        } else {
            Properties::new()
        };

        let mut reasons = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let reason = ReasonCode::decode(ba)?;
            if protocol_version.is_v5() && !SUBSCRIBE_ACK_REASONS.contains(&reason) {
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

impl Packet for SubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubscribeAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip() {
        let packet = SubscribeAckPacket::new(PacketId::new(3), ReasonCode::GrantedQoS1);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert_eq!(decoded.reasons(), [ReasonCode::GrantedQoS1]);
    }

    #[test]
    fn v5_roundtrip_with_multiple_reasons() {
        let packet = SubscribeAckPacket::with_reasons(
            PacketId::new(4),
            vec![ReasonCode::GrantedQoS2, ReasonCode::TopicFilterInvalid],
        );
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reasons(), [ReasonCode::GrantedQoS2, ReasonCode::TopicFilterInvalid]);
    }
}
