// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;

use crate::base::{DecodePacket, EncodePacket, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::var_int::VarInt;

/// Every decoded packet implements this so callers can ask its type and wire
/// length without matching on the outer `Packet` enum.
pub trait Packet: fmt::Debug {
    fn packet_type(&self) -> PacketType;
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PacketType {
    #[default]
    Connect,
    ConnectAck,
    Publish { dup: bool, qos: QoS, retain: bool },
    PublishAck,
    PublishReceived,
    PublishRelease,
    PublishComplete,
    Subscribe,
    SubscribeAck,
    Unsubscribe,
    UnsubscribeAck,
    PingRequest,
    PingResponse,
    Disconnect,
    /// MQTT 5 only.
    Auth,
}

impl PacketType {
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        let type_bits: u8 = match packet_type {
            PacketType::Connect => 1,
            PacketType::ConnectAck => 2,
            PacketType::Publish { .. } => 3,
            PacketType::PublishAck => 4,
            PacketType::PublishReceived => 5,
            PacketType::PublishRelease => 6,
            PacketType::PublishComplete => 7,
            PacketType::Subscribe => 8,
            PacketType::SubscribeAck => 9,
            PacketType::Unsubscribe => 10,
            PacketType::UnsubscribeAck => 11,
            PacketType::PingRequest => 12,
            PacketType::PingResponse => 13,
            PacketType::Disconnect => 14,
            PacketType::Auth => 15,
        };

        let flag_bits: u8 = match packet_type {
            PacketType::Publish { dup, qos, retain } => {
                let dup = if dup { 0b1000 } else { 0 };
                let qos = match qos {
                    QoS::AtMostOnce => 0b0000,
                    QoS::AtLeastOnce => 0b0010,
                    QoS::ExactlyOnce => 0b0100,
                };
                let retain = u8::from(retain);
                dup | qos | retain
            }
            // Bits 3,2,1,0 of PUBREL/SUBSCRIBE/UNSUBSCRIBE are reserved and
            // MUST be 0,0,1,0 [MQTT-3.6.1-1].
            PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0,
        };

        (type_bits << 4) | flag_bits
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0xf0) >> 4;
        let flags = v & 0x0f;

        // Where a flag bit is marked "Reserved", it MUST be set to the
        // listed value; a receiver getting invalid flags MUST close the
        // connection [MQTT-2.2.2-1], [MQTT-2.2.2-2].
        match type_bits {
            1 if flags == 0 => Ok(Self::Connect),
            2 if flags == 0 => Ok(Self::ConnectAck),
            3 => {
                let dup = flags & 0b1000 != 0;
                let retain = flags & 0b0001 != 0;
                let qos = QoS::try_from((flags & 0b0110) >> 1)?;
                Ok(Self::Publish { dup, qos, retain })
            }
            4 if flags == 0 => Ok(Self::PublishAck),
            5 if flags == 0 => Ok(Self::PublishReceived),
            6 if flags == 0b0010 => Ok(Self::PublishRelease),
            7 if flags == 0 => Ok(Self::PublishComplete),
            8 if flags == 0b0010 => Ok(Self::Subscribe),
            9 if flags == 0 => Ok(Self::SubscribeAck),
            10 if flags == 0b0010 => Ok(Self::Unsubscribe),
            11 if flags == 0 => Ok(Self::UnsubscribeAck),
            12 if flags == 0 => Ok(Self::PingRequest),
            13 if flags == 0 => Ok(Self::PingResponse),
            14 if flags == 0 => Ok(Self::Disconnect),
            // AUTH's fixed header flags MUST be 0 [MQTT-3.15.1-1].
            15 if flags == 0 => Ok(Self::Auth),
            1..=15 => Err(DecodeError::InvalidPacketFlags),
            _ => Err(DecodeError::InvalidPacketType),
        }
    }
}

/// Fixed header common to every MQTT control packet.
///
/// ```txt
///  7 6 5 4 3 2 1 0
/// +-------+-------+
/// | Type  | Flags |
/// +-------+-------+
/// | Remaining Len |
/// +-------+-------+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FixedHeader {
    packet_type: PacketType,
    remaining_length: VarInt,
}

impl FixedHeader {
    pub fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, EncodeError> {
        let remaining_length =
            VarInt::try_from(remaining_length).map_err(|_| EncodeError::InvalidVarInt)?;
        Ok(Self { packet_type, remaining_length })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value() as usize
    }

    #[must_use]
    pub const fn header_bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;
        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?;

        if remaining_length.value() as usize > ba.remaining_bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self { packet_type, remaining_length })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let byte: u8 = self.packet_type.into();
        buf.push(byte);
        let len_bytes = self.remaining_length.encode(buf)?;
        Ok(PacketType::bytes() + len_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let header = FixedHeader::new(PacketType::PingRequest, 0).unwrap();
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(buf, [0xc0, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(decoded.packet_type(), PacketType::PingRequest);
        assert_eq!(decoded.remaining_length(), 0);
    }

    #[test]
    fn rejects_oversized_remaining_length() {
        // Declares 19 bytes remaining but only supplies 2.
        let buf = [0x30, 0x13, 0x00, 0x05];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba),
            Err(DecodeError::InvalidRemainingLength)
        );
    }

    #[test]
    fn rejects_reserved_flag_violations() {
        // SUBSCRIBE with flags = 0 instead of the mandated 0b0010.
        let buf = [0x80, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}
