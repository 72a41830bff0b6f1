// DISCONNECT packet (3.1/3.1.1 section 3.14, 5.0 section 3.14).
//
// 3.1/3.1.1 has no variable header or payload at all. v5 adds an optional
// reason code + properties tail, omitted entirely when the reason is
// `Success` (encoded as `NormalDisconnection` on the wire, wire value 0)
// and there are no properties.

use crate::base::{DecodePacket, EncodePacket, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::reason_code::ReasonCode;

pub const DISCONNECT_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::DisconnectWithWillMessage,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerBusy,
    ReasonCode::ServerShuttingDown,
    ReasonCode::KeepAliveTimeout,
    ReasonCode::SessionTakenOver,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::TopicNameInvalid,
    ReasonCode::ReceiveMaximumExceeded,
    ReasonCode::TopicAliasInvalid,
    ReasonCode::QuotaExceeded,
    ReasonCode::AdministrativeAction,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::RetainNotSupported,
    ReasonCode::QoSNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::ConnectionRateExceeded,
    ReasonCode::MaximumConnectTime,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

pub const DISCONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::ServerReference,
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisconnectPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    fn has_tail(&self) -> bool {
        self.reason_code != ReasonCode::Success || !self.properties.is_empty()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let include_tail = protocol_version.is_v5() && self.has_tail();
        let remaining = if include_tail {
            ReasonCode::bytes() + self.properties.bytes()
        } else {
            0
        };
        let fixed_header = FixedHeader::new(PacketType::Disconnect, remaining)?;
        fixed_header.encode(buf)?;
        if include_tail {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }
        if !protocol_version.is_v5() {
            if fixed_header.remaining_length() != 0 {
                return Err(DecodeError::InvalidRemainingLength);
            }
            return Ok(Self::default());
        }
        if fixed_header.remaining_length() == 0 {
            return Ok(Self::default());
        }

        let reason_code = ReasonCode::decode(ba)?;
        if !DISCONNECT_REASONS.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        let properties = if fixed_header.remaining_length() > ReasonCode::bytes() {
            let properties = Properties::decode(ba)?;
            check_property_type_list(properties.as_slice(), DISCONNECT_PROPERTIES)
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            properties
        } else {
            Properties::new()
        };

        Ok(Self { reason_code, properties })
    }
}

impl Packet for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_is_fixed_header_only() {
        let packet = DisconnectPacket::new();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        assert_eq!(buf, [0xe0, 0x00]);
    }

    #[test]
    fn v5_success_with_no_properties_also_omits_tail() {
        let packet = DisconnectPacket::new();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        assert_eq!(buf, [0xe0, 0x00]);
    }

    #[test]
    fn v5_roundtrip_with_reason_and_properties() {
        let mut packet = DisconnectPacket::new();
        packet.set_reason_code(ReasonCode::SessionTakenOver);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::SessionTakenOver);
    }
}
