// Shared shape behind PUBACK, PUBREC, PUBREL and PUBCOMP (3.1/3.1.1 sections
// 3.4/3.5/3.6/3.7, 5.0 sections 3.4/3.5/3.6/3.7): packet id, and on v5 only,
// an optional reason code + properties tail that is entirely omitted when
// the reason is Success and there are no properties [MQTT-3.4.2-1].

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::reason_code::ReasonCode;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacketIdAck {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PacketIdAck {
    #[must_use]
    pub fn new(packet_id: PacketId) -> Self {
        Self { packet_id, reason_code: ReasonCode::Success, properties: Properties::new() }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.reason_code = reason_code;
        self
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn has_reason_tail(&self) -> bool {
        self.reason_code != ReasonCode::Success || !self.properties.is_empty()
    }

    pub fn encode_for(
        &self,
        buf: &mut Vec<u8>,
        packet_type: PacketType,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let mut remaining = PacketId::bytes();
        if self.has_reason_tail() {
            remaining += ReasonCode::bytes();
            if !self.properties.is_empty() {
                remaining += self.properties.bytes();
            }
        }
        let fixed_header = FixedHeader::new(packet_type, remaining)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if self.has_reason_tail() {
            buf.push(self.reason_code.into());
            if !self.properties.is_empty() {
                self.properties.encode(buf)?;
            }
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for(
        ba: &mut ByteArray,
        expected_type: PacketType,
        allowed_reasons: &[ReasonCode],
        allowed_properties: &[PropertyType],
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != expected_type {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() < PacketId::bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let packet_id = PacketId::decode(ba)?;
        let remaining = fixed_header.remaining_length() - PacketId::bytes();

        let reason_code = if remaining >= ReasonCode::bytes() {
            ReasonCode::decode(ba)?
        } else {
            ReasonCode::Success
        };
        if !allowed_reasons.is_empty() && !allowed_reasons.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }

        let properties = if remaining > ReasonCode::bytes() {
            let properties = Properties::decode(ba)?;
            check_property_type_list(properties.as_slice(), allowed_properties)
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            properties
        } else {
            Properties::new()
        };

        Ok(Self { packet_id, reason_code, properties })
    }
}

/// Protocol-version-agnostic wire handling is identical for all four ack
/// packets below; only the allowed reason-code/property tables and the
/// fixed header's packet type differ. v3.1/3.1.1 packets never carry a
/// reason or properties, so both vanish to their `Success`/empty defaults
/// when `protocol_version` is not V5 — callers that only need the packet id
/// can ignore the rest entirely.
pub fn encode_ack(
    ack: &PacketIdAck,
    buf: &mut Vec<u8>,
    packet_type: PacketType,
    protocol_version: ProtocolVersion,
) -> Result<usize, EncodeError> {
    if protocol_version.is_v5() {
        ack.encode_for(buf, packet_type)
    } else {
        let old_len = buf.len();
        let fixed_header = FixedHeader::new(packet_type, PacketId::bytes())?;
        fixed_header.encode(buf)?;
        ack.packet_id().encode(buf)?;
        Ok(buf.len() - old_len)
    }
}

pub fn decode_ack(
    ba: &mut ByteArray,
    expected_type: PacketType,
    allowed_reasons: &[ReasonCode],
    allowed_properties: &[PropertyType],
) -> Result<PacketIdAck, DecodeError> {
    PacketIdAck::decode_for(ba, expected_type, allowed_reasons, allowed_properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_ack_is_just_the_packet_id() {
        let ack = PacketIdAck::new(PacketId::new(9));
        let mut buf = Vec::new();
        encode_ack(&ack, &mut buf, PacketType::PublishAck, ProtocolVersion::V3_11).unwrap();
        assert_eq!(buf, [0x40, 0x02, 0x00, 0x09]);
    }

    #[test]
    fn success_with_no_properties_omits_reason_tail() {
        let ack = PacketIdAck::new(PacketId::new(1));
        let mut buf = Vec::new();
        ack.encode_for(&mut buf, PacketType::PublishAck).unwrap();
        assert_eq!(buf, [0x40, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn non_success_reason_roundtrips() {
        let mut ack = PacketIdAck::new(PacketId::new(1));
        ack.set_reason_code(ReasonCode::NoMatchingSubscribers);
        let mut buf = Vec::new();
        ack.encode_for(&mut buf, PacketType::PublishAck).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded =
            decode_ack(&mut ba, PacketType::PublishAck, &[], &[PropertyType::ReasonString]).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::NoMatchingSubscribers);
    }
}
