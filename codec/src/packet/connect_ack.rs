// CONNACK packet (3.1/3.1.1 section 3.2, 5.0 section 3.2).
//
// 3.1/3.1.1 and 5.0 disagree on the reason/return code vocabulary (six
// return codes vs. the full reason code table), so `ConnectAckPacket` keeps
// two single-byte representations side by side rather than forcing one
// wire value space onto both protocol generations.

use crate::base::{DecodePacket, EncodePacket, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::Properties;
use crate::reason_code::ReasonCode;

/// 3.1/3.1.1 CONNACK return codes [MQTT-3.2.2-?]. The server MUST close the
/// connection if this is anything other than `Accepted`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectReturnCode {
    #[default]
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<u8> for ConnectReturnCode {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUsernameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Accepted,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectAckReason {
    V3(ConnectReturnCode),
    V5(ReasonCode),
}

impl ConnectAckReason {
    #[must_use]
    pub const fn is_success(self) -> bool {
        match self {
            Self::V3(rc) => rc.is_accepted(),
            Self::V5(rc) => rc.is_success(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectAckPacket {
    session_present: bool,
    reason: ConnectAckReason,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason: ConnectAckReason) -> Self {
        // A non-success CONNACK MUST carry Session Present = 0 [MQTT-3.2.2-4].
        let session_present = session_present && reason.is_success();
        Self { session_present, reason, properties: Properties::new() }
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    #[must_use]
    pub const fn reason(&self) -> ConnectAckReason {
        self.reason
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn reason_byte(&self) -> u8 {
        match self.reason {
            ConnectAckReason::V3(rc) => rc as u8,
            ConnectAckReason::V5(rc) => rc.into(),
        }
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let is_v5 = matches!(self.reason, ConnectAckReason::V5(_));
        let remaining = 2 + if is_v5 { self.properties.bytes() } else { 0 };
        let fixed_header = FixedHeader::new(PacketType::ConnectAck, remaining)?;
        fixed_header.encode(buf)?;

        buf.push(u8::from(self.session_present));
        buf.push(self.reason_byte());
        if is_v5 {
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

impl ConnectAckPacket {
    /// Decode a CONNACK whose wire format is governed by `protocol_version`
    /// (CONNACK carries no version field of its own).
    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let ack_flags = ba.read_byte()?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let session_present = ack_flags & 0b0000_0001 != 0;
        let reason_byte = ba.read_byte()?;

        if protocol_version.is_v5() {
            let reason = ReasonCode::try_from(reason_byte)?;
            let properties = Properties::decode(ba)?;
            Ok(Self { session_present, reason: ConnectAckReason::V5(reason), properties })
        } else {
            let reason = ConnectReturnCode::from(reason_byte);
            Ok(Self {
                session_present,
                reason: ConnectAckReason::V3(reason),
                properties: Properties::new(),
            })
        }
    }
}

impl Packet for ConnectAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnectAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip() {
        let packet = ConnectAckPacket::new(false, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert!(!decoded.session_present());
        assert!(decoded.reason().is_success());
    }

    #[test]
    fn v5_roundtrip_with_properties() {
        let mut packet = ConnectAckPacket::new(true, ConnectAckReason::V5(ReasonCode::Success));
        packet.mut_properties().push(crate::property::Property::ServerKeepAlive(
            crate::primitive::U16Data::new(30),
        ));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert!(decoded.session_present());
        assert_eq!(decoded.properties().len(), 1);
    }

    #[test]
    fn non_success_forces_session_present_false() {
        let packet = ConnectAckPacket::new(true, ConnectAckReason::V3(ConnectReturnCode::NotAuthorized));
        assert!(!packet.session_present());
    }
}
