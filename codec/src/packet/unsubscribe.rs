// UNSUBSCRIBE packet (3.1/3.1.1 section 3.10, 5.0 section 3.10).

use crate::base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::topic::TopicFilter;

pub const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnsubscribePacket {
    packet_id: PacketId,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
    filters: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    pub fn new(filter: &str, packet_id: PacketId) -> Result<Self, EncodeError> {
        Ok(Self { packet_id, properties: Properties::new(), filters: vec![TopicFilter::new(filter)?] })
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
    pub fn filters(&self) -> Vec<&str> {
        self.filters.iter().map(TopicFilter::as_str).collect()
    }

    pub fn mut_filters(&mut self) -> &mut Vec<TopicFilter> {
        &mut self.filters
    }

    fn remaining_length(&self, protocol_version: ProtocolVersion) -> usize {
        let mut len = PacketId::bytes();
        if protocol_version.is_v5() {
            len += self.properties.bytes();
        }
        len + self.filters.iter().map(TopicFilter::bytes).sum::<usize>()
    }

    pub fn encode_for_version(
        &self,
        buf: &mut Vec<u8>,
        protocol_version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header =
            FixedHeader::new(PacketType::Unsubscribe, self.remaining_length(protocol_version))?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        for filter in &self.filters {
            filter.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    pub fn decode_for_version(
        ba: &mut ByteArray,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Unsubscribe {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;
        if packet_id.is_zero() {
            return Err(DecodeError::InvalidPacketId);
        }

        let mut consumed = PacketId::bytes();
        let properties = if protocol_version.is_v5() {
            let properties = Properties::decode(ba)?;
            check_property_type_list(properties.as_slice(), UNSUBSCRIBE_PROPERTIES)
                .map_err(|_| DecodeError::InvalidPropertyId)?;
            consumed += properties.bytes();
            properties
        } else {
            Properties::new()
        };

        let mut filters = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let filter = TopicFilter::decode(ba)?;
            consumed += filter.bytes();
            filters.push(filter);
        }
        if filters.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        Ok(Self { packet_id, properties, filters })
    }
}

impl Packet for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip() {
        let packet = UnsubscribePacket::new("a/b", PacketId::new(6)).unwrap();
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V3_11).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribePacket::decode_for_version(&mut ba, ProtocolVersion::V3_11).unwrap();
        assert_eq!(decoded.filters(), vec!["a/b"]);
    }

    #[test]
    fn v5_roundtrip_multiple_filters() {
        let mut packet = UnsubscribePacket::new("a/b", PacketId::new(2)).unwrap();
        packet.mut_filters().push(TopicFilter::new("c/d").unwrap());
        let mut buf = Vec::new();
        packet.encode_for_version(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribePacket::decode_for_version(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.filters(), vec!["a/b", "c/d"]);
    }
}
