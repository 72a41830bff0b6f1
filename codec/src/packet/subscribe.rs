// SUBSCRIBE packet (3.1/3.1.1 section 3.8, 5.0 section 3.8).

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_multiple_subscription_identifiers, check_property_type_list, Properties, PropertyType};
use crate::topic::TopicFilter;

pub const SUBSCRIBE_PROPERTIES: &[PropertyType] =
    &[PropertyType::SubscriptionIdentifier, PropertyType::UserProperty];

/// Bits 4-5 of the v5 subscription options byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetainHandling {
    #[default]
    SendAtSubscribe = 0,
    SendIfNewSubscription = 1,
    DoNotSend = 2,
}

impl TryFrom<u8> for RetainHandling {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::SendAtSubscribe),
            1 => Ok(Self::SendIfNewSubscription),
            2 => Ok(Self::DoNotSend),
            _ => Err(DecodeError::InvalidPropertyValue),
        }
    }
}

/// A topic filter together with its subscription options. `no_local`,
/// `retain_as_published` and `retain_handling` are meaningful only on v5;
/// they encode to their default (all-zero) bits on 3.1/3.1.1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribeTopic {
    filter: TopicFilter,
    qos: QoS,
    no_local: bool,
    retain_as_published: bool,
    retain_handling: RetainHandling,
}

impl SubscribeTopic {
    pub fn new(filter: &str, qos: QoS) -> Result<Self, EncodeError> {
        Ok(Self { filter: TopicFilter::new(filter)?, qos, ..Self::default() })
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter.as_str()
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_no_local(&mut self, no_local: bool) -> &mut Self {
        self.no_local = no_local;
        self
    }

    #[must_use]
    pub const fn no_local(&self) -> bool {
        self.no_local
    }

    pub fn set_retain_as_published(&mut self, retain_as_published: bool) -> &mut Self {
        self.retain_as_published = retain_as_published;
        self
    }

    #[must_use]
    pub const fn retain_as_published(&self) -> bool {
        self.retain_as_published
    }

    pub fn set_retain_handling(&mut self, retain_handling: RetainHandling) -> &mut Self {
        self.retain_handling = retain_handling;
        self
    }

    #[must_use]
    pub const fn retain_handling(&self) -> RetainHandling {
        self.retain_handling
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.filter.bytes() + 1
    }
}

impl EncodePacket for SubscribeTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.filter.encode(buf)?;
        let mut options = u8::from(self.qos) & 0b0000_0011;
        if self.no_local {
            options |= 0b0000_0100;
        }
        if self.retain_as_published {
            options |= 0b0000_1000;
        }
        options |= (self.retain_handling as u8) << 4;
        buf.push(options);
        Ok(self.bytes())
    }
}

impl DecodePacket for SubscribeTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let filter = TopicFilter::decode(ba)?;
        let options = ba.read_byte()?;
        if options & 0b1100_0000 != 0 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        let qos = QoS::try_from(options & 0b0000_0011)?;
        let no_local = options & 0b0000_0100 != 0;
        let retain_as_published = options & 0b0000_1000 != 0;
        let retain_handling = RetainHandling::try_from((options & 0b0011_0000) >> 4)?;
        Ok(Self { filter, qos, no_local, retain_as_published, retain_handling })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribePacket {
    packet_id: PacketId,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    pub fn new(filter: &str, qos: QoS, packet_id: PacketId) -> Result<Self, EncodeError> {
        Ok(Self {
            packet_id,
            properties: Properties::new(),
            topics: vec![SubscribeTopic::new(filter, qos)?],
        })
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

    pub fn mut_topics(&mut self) -> &mut Vec<SubscribeTopic> {
        &mut self.topics
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    fn remaining_length(&self, protocol_version: ProtocolVersion) -> usize {
        let mut len = PacketId::bytes();
        if protocol_version.is_v5() {
            len += self.properties.bytes();
        }
        len + self.topics.iter().map(SubscribeTopic::bytes).sum::<usize>()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header =
            FixedHeader::new(PacketType::Subscribe, self.remaining_length(protocol_version))?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        for topic in &self.topics {
            topic.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Subscribe {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;
        if packet_id.is_zero() {
            return Err(DecodeError::InvalidPacketId);
        }

        let mut consumed = PacketId::bytes();
        let properties = if protocol_version.is_v5() {
            let properties = Properties::decode(ba)?;
            check_property_type_list(properties.as_slice(), SUBSCRIBE_PROPERTIES)
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            check_multiple_subscription_identifiers(properties.as_slice())
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            consumed += properties.bytes();
            properties
        } else {
            Properties::new()
        };

        let mut topics = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let topic = SubscribeTopic::decode(ba)?;
            consumed += topic.bytes();
            topics.push(topic);
        }
        if topics.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        Ok(Self { packet_id, properties, topics })
    }
}

impl Packet for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip() {
        let packet = SubscribePacket::new("a/b", QoS::AtLeastOnce, PacketId::new(1)).unwrap();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert_eq!(decoded.topics().len(), 1);
        assert_eq!(decoded.topics()[0].filter(), "a/b");
        assert_eq!(decoded.topics()[0].qos(), QoS::AtLeastOnce);
    }

    #[test]
    fn v5_roundtrip_with_subscription_options() {
        let mut packet = SubscribePacket::new("a/+", QoS::ExactlyOnce, PacketId::new(9)).unwrap();
        packet.mut_topics()[0].set_no_local(true);
        packet.mut_topics()[0].set_retain_handling(RetainHandling::DoNotSend);
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert!(decoded.topics()[0].no_local());
        assert_eq!(decoded.topics()[0].retain_handling(), RetainHandling::DoNotSend);
    }

    #[test]
    fn rejects_empty_payload() {
        let mut buf = Vec::new();
        buf.push(0x82); // SUBSCRIBE, reserved flags 0b0010
        buf.push(0x02); // remaining length = 2 (packet id only)
        buf.extend_from_slice(&[0x00, 0x01]);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SubscribePacket::decode_for_version(&mut ba, ProtocolVersion::V3_11),
            Err(DecodeError::EmptyPayload)
        );
    }
}
