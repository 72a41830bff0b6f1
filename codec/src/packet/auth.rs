// AUTH packet, MQTT 5.0 only (section 3.15): enhanced/re-authentication
// exchange. It is a protocol error to send this on 3.1/3.1.1 connections,
// or on a v5 connection that didn't negotiate an Authentication Method in
// CONNECT — callers are responsible for that check since it depends on
// connection state this codec does not track.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::reason_code::ReasonCode;

pub const AUTH_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::ContinueAuthentication, ReasonCode::ReAuthenticate];

pub const AUTH_PROPERTIES: &[PropertyType] = &[
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl AuthPacket {
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
}

impl EncodePacket for AuthPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let remaining = ReasonCode::bytes() + self.properties.bytes();
        let fixed_header = FixedHeader::new(PacketType::Auth, remaining)?;
        fixed_header.encode(buf)?;
        self.reason_code.encode(buf)?;
        self.properties.encode(buf)?;
        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for AuthPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Auth {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() == 0 {
            return Ok(Self::default());
        }

        let reason_code = ReasonCode::decode(ba)?;
        if !AUTH_REASONS.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        let properties = Properties::decode(ba)?;
        check_property_type_list(properties.as_slice(), AUTH_PROPERTIES)
            .map_err(|_| DecodeError::InvalidPropertyId)?;

        Ok(Self { reason_code, properties })
    }
}

impl Packet for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roundtrips_as_empty_body() {
        let packet = AuthPacket::new();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = AuthPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }

    #[test]
    fn roundtrips_continue_authentication_with_method() {
        let mut packet = AuthPacket::new();
        packet.set_reason_code(ReasonCode::ContinueAuthentication);
        packet.mut_properties().push(crate::property::Property::AuthenticationMethod(
            crate::primitive::StringData::new("SCRAM-SHA-1").unwrap(),
        ));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = AuthPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::ContinueAuthentication);
        assert_eq!(decoded.properties().len(), 1);
    }
}
