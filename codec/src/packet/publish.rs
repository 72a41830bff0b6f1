// PUBLISH packet (3.1/3.1.1 section 3.3, 5.0 section 3.3).

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::Properties;
use crate::topic::PubTopic;

#[derive(Clone, Debug, PartialEq)]
pub struct PublishPacket {
    dup: bool,
    qos: QoS,
    retain: bool,
    topic: PubTopic,
    /// Present (and non-zero) only when `qos != AtMostOnce` [MQTT-2.3.1-1].
    packet_id: Option<PacketId>,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
    payload: Vec<u8>,
}

impl PublishPacket {
    pub fn new(topic: &str, qos: QoS, payload: &[u8]) -> Result<Self, EncodeError> {
        Ok(Self {
            dup: false,
            qos,
            retain: false,
            topic: PubTopic::new(topic)?,
            packet_id: None,
            properties: Properties::new(),
            payload: payload.to_vec(),
        })
    }

    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        // DUP MUST be 0 for QoS 0 [MQTT-3.3.1-2].
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketFlags);
        }
        self.dup = dup;
        Ok(self)
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_str()
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> Result<&mut Self, EncodeError> {
        if self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketFlags);
        }
        self.packet_id = Some(packet_id);
        Ok(self)
    }

    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        self.packet_id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn remaining_length(&self, protocol_version: ProtocolVersion) -> usize {
        let mut len = self.topic.bytes();
        if self.qos != QoS::AtMostOnce {
            len += PacketId::bytes();
        }
        if protocol_version.is_v5() {
            len += self.properties.bytes();
        }
        len + self.payload.len()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        if self.qos != QoS::AtMostOnce && self.packet_id.is_none() {
            return Err(EncodeError::InvalidPacketFlags);
        }
        let old_len = buf.len();
        let packet_type = PacketType::Publish { dup: self.dup, qos: self.qos, retain: self.retain };
        let fixed_header = FixedHeader::new(packet_type, self.remaining_length(protocol_version))?;
        fixed_header.encode(buf)?;

        self.topic.encode(buf)?;
        if let Some(packet_id) = self.packet_id {
            packet_id.encode(buf)?;
        }
        if protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        buf.extend_from_slice(&self.payload);

        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            return Err(DecodeError::InvalidPacketType);
        };
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let start = ba.offset();
        let topic = PubTopic::decode(ba)?;
        let packet_id = if qos != QoS::AtMostOnce { Some(PacketId::decode(ba)?) } else { None };
        let properties =
            if protocol_version.is_v5() { Properties::decode(ba)? } else { Properties::new() };

        let consumed = ba.offset() - start;
        let payload_len = fixed_header
            .remaining_length()
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = ba.read_bytes(payload_len)?.to_vec();

        Ok(Self { dup, qos, retain, topic, packet_id, properties, payload })
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish { dup: self.dup, qos: self.qos, retain: self.retain }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos0_roundtrip_without_packet_id() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"hello").unwrap();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert_eq!(decoded.topic(), "a/b");
        assert_eq!(decoded.payload(), b"hello");
        assert!(decoded.packet_id().is_none());
    }

    #[test]
    fn qos1_requires_packet_id_to_encode() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"hi").unwrap();
        let mut buf = Vec::new();
        assert!(packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).is_err());
    }

    #[test]
    fn v5_roundtrip_with_properties_and_packet_id() {
        let mut packet = PublishPacket::new("a/b", QoS::ExactlyOnce, b"payload").unwrap();
        packet.set_packet_id(PacketId::new(7)).unwrap();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.packet_id(), Some(PacketId::new(7)));
        assert_eq!(decoded.payload(), b"payload");
    }
}
