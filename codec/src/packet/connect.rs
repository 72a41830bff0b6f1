// CONNECT packet (MQTT 3.1 section 3.1, 3.1.1 section 3.1, 5.0 section 3.1).
//
// Single struct parameterized by `ProtocolVersion` rather than separate v3/v5
// structs: the v5-only fields (`properties`, `will_properties`) simply stay
// empty when decoding/encoding a 3.1/3.1.1 packet.

use byteorder::{BigEndian, WriteBytesExt};

use crate::base::{DecodePacket, EncodePacket, ProtocolVersion, QoS};
use crate::byte_array::ByteArray;
use crate::connect_flags::ConnectFlags;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, Packet, PacketType};
use crate::property::Properties;
use crate::topic::PubTopic;

#[derive(Clone, Debug, PartialEq)]
pub struct Will {
    pub topic: PubTopic,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    /// v5 only; empty on 3.1/3.1.1.
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectPacket {
    protocol_version: ProtocolVersion,
    clean_start: bool,
    keep_alive: u16,
    /// v5 only; empty on 3.1/3.1.1.
    properties: Properties,
    client_id: String,
    will: Option<Will>,
    username: Option<String>,
    password: Option<Vec<u8>>,
}

impl ConnectPacket {
    pub fn new(client_id: &str, protocol_version: ProtocolVersion) -> Result<Self, EncodeError> {
        if client_id.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyData);
        }
        Ok(Self {
            protocol_version,
            clean_start: true,
            keep_alive: 60,
            properties: Properties::new(),
            client_id: client_id.to_string(),
            will: None,
            username: None,
            password: None,
        })
    }

    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.clean_start = clean_start;
        self
    }

    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_will(&mut self, will: Option<Will>) -> &mut Self {
        self.will = will;
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    pub fn set_username(&mut self, username: Option<&str>) -> &mut Self {
        self.username = username.map(ToString::to_string);
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_password(&mut self, password: Option<&[u8]>) -> &mut Self {
        self.password = password.map(<[u8]>::to_vec);
        self
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn connect_flags(&self) -> ConnectFlags {
        let mut flags = ConnectFlags::new(self.clean_start);
        if let Some(will) = &self.will {
            flags.set_will(true, will.qos, will.retain);
        }
        flags.set_has_username(self.username.is_some());
        flags.set_has_password(self.password.is_some());
        flags
    }

    fn remaining_length(&self) -> usize {
        let mut len = self.protocol_version.name().len()
            + 2
            + 1 // protocol version byte
            + ConnectFlags::bytes()
            + 2; // keep alive
        if self.protocol_version.is_v5() {
            len += self.properties.bytes();
        }
        len += 2 + self.client_id.len();
        if let Some(will) = &self.will {
            if self.protocol_version.is_v5() {
                len += will.properties.bytes();
            }
            len += will.topic.bytes();
            len += 2 + will.message.len();
        }
        if let Some(username) = &self.username {
            len += 2 + username.len();
        }
        if let Some(password) = &self.password {
            len += 2 + password.len();
        }
        len
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        fixed_header.encode(buf)?;

        let name = self.protocol_version.name();
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u16::<BigEndian>(name.len() as u16)?;
        buf.extend_from_slice(name.as_bytes());
        buf.push(self.protocol_version as u8);
        self.connect_flags().encode(buf)?;
        buf.write_u16::<BigEndian>(self.keep_alive)?;
        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        encode_str(&self.client_id, buf)?;

        if let Some(will) = &self.will {
            if self.protocol_version.is_v5() {
                will.properties.encode(buf)?;
            }
            will.topic.encode(buf)?;
            encode_bin(&will.message, buf)?;
        }
        if let Some(username) = &self.username {
            encode_str(username, buf)?;
        }
        if let Some(password) = &self.password {
            encode_bin(password, buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

fn encode_str(s: &str, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    if s.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyData);
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.write_u16::<BigEndian>(s.len() as u16)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn encode_bin(data: &[u8], buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    if data.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyData);
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.write_u16::<BigEndian>(data.len() as u16)?;
    buf.extend_from_slice(data);
    Ok(())
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = ba.read_string()?;
        let protocol_version = ProtocolVersion::try_from(ba.read_byte()?)?;
        if protocol_name != protocol_version.name() {
            return Err(DecodeError::InvalidProtocolName);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        // If User Name Flag is 0, Password Flag MUST be 0 [MQTT-3.1.2-22].
        if !connect_flags.has_username() && connect_flags.has_password() {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let keep_alive = ba.read_u16()?;

        let properties = if protocol_version.is_v5() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };

        let client_id = ba.read_string()?;
        // A zero-length client id MUST come with Clean Start/Session set
        // [MQTT-3.1.3-7], [MQTT-3.1.3-8].
        if client_id.is_empty() && !connect_flags.clean_start() {
            return Err(DecodeError::InvalidClientId);
        }

        let will = if connect_flags.will() {
            let will_properties = if protocol_version.is_v5() {
                Properties::decode(ba)?
            } else {
                Properties::new()
            };
            let topic = PubTopic::decode(ba)?;
            let message = ba.read_binary()?;
            Some(Will {
                topic,
                message,
                qos: connect_flags.will_qos(),
                retain: connect_flags.will_retain(),
                properties: will_properties,
            })
        } else {
            None
        };

        let username =
            if connect_flags.has_username() { Some(ba.read_string()?) } else { None };
        let password =
            if connect_flags.has_password() { Some(ba.read_binary()?) } else { None };

        Ok(Self {
            protocol_version,
            clean_start: connect_flags.clean_start(),
            keep_alive,
            properties,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_roundtrip_without_will() {
        let mut packet = ConnectPacket::new("client-1", ProtocolVersion::V3_11).unwrap();
        packet.set_username(Some("alice"));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.client_id(), "client-1");
        assert_eq!(decoded.username(), Some("alice"));
        assert!(decoded.will().is_none());
    }

    #[test]
    fn v5_roundtrip_with_will() {
        let mut packet = ConnectPacket::new("client-2", ProtocolVersion::V5).unwrap();
        packet.set_will(Some(Will {
            topic: PubTopic::new("lwt/client-2").unwrap(),
            message: b"offline".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
            properties: Properties::new(),
        }));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        let will = decoded.will().unwrap();
        assert_eq!(will.topic.as_str(), "lwt/client-2");
        assert_eq!(will.message, b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn rejects_empty_client_id_without_clean_start() {
        let mut packet = ConnectPacket::new("", ProtocolVersion::V3_11).unwrap();
        packet.set_clean_start(false);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba), Err(DecodeError::InvalidClientId));
    }
}
