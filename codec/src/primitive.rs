// Wire primitives shared by property values and packet fields: a thin
// `DecodePacket`/`EncodePacket` wrapper per MQTT 5 data type so a property's
// payload can be decoded/encoded uniformly regardless of its underlying Rust
// type.

use byteorder::{BigEndian, WriteBytesExt};

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BoolData(bool);

impl BoolData {
    #[must_use]
    pub const fn new(value: bool) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> bool {
        self.0
    }

    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl DecodePacket for BoolData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        match ba.read_byte()? {
            0x00 => Ok(Self(false)),
            0x01 => Ok(Self(true)),
            _ => Err(DecodeError::InvalidPropertyValue),
        }
    }
}

impl EncodePacket for BoolData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.0));
        Ok(Self::bytes())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct U16Data(u16);

impl U16Data {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn bytes() -> usize {
        2
    }
}

impl From<u16> for U16Data {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl DecodePacket for U16Data {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(ba.read_u16()?))
    }
}

impl EncodePacket for U16Data {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.write_u16::<BigEndian>(self.0)?;
        Ok(Self::bytes())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct U32Data(u32);

impl U32Data {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn bytes() -> usize {
        4
    }
}

impl From<u32> for U32Data {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl DecodePacket for U32Data {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(ba.read_u32()?))
    }
}

impl EncodePacket for U32Data {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.write_u32::<BigEndian>(self.0)?;
        Ok(Self::bytes())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringData(String);

impl StringData {
    pub fn new(s: &str) -> Result<Self, EncodeError> {
        if s.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyData);
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StringData {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for StringData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(ba.read_string()?))
    }
}

impl EncodePacket for StringData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u16::<BigEndian>(self.0.len() as u16)?;
        buf.extend_from_slice(self.0.as_bytes());
        Ok(self.bytes())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinaryData(Vec<u8>);

impl BinaryData {
    pub fn new(data: &[u8]) -> Result<Self, EncodeError> {
        if data.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyData);
        }
        Ok(Self(data.to_vec()))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for BinaryData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl DecodePacket for BinaryData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(ba.read_binary()?))
    }
}

impl EncodePacket for BinaryData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u16::<BigEndian>(self.0.len() as u16)?;
        buf.extend_from_slice(&self.0);
        Ok(self.bytes())
    }
}

/// Name/value pair used by the User Property (0x26), the only property that
/// may repeat with distinct values for the same key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringPairData(StringData, StringData);

impl StringPairData {
    pub fn new(key: &str, value: &str) -> Result<Self, EncodeError> {
        Ok(Self(StringData::new(key)?, StringData::new(value)?))
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.1.as_str()
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.0.bytes() + self.1.bytes()
    }
}

impl DecodePacket for StringPairData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(StringData::decode(ba)?, StringData::decode(ba)?))
    }
}

impl EncodePacket for StringPairData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(self.0.encode(buf)? + self.1.encode(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_pair_roundtrip() {
        let pair = StringPairData::new("k", "v").unwrap();
        let mut buf = Vec::new();
        pair.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = StringPairData::decode(&mut ba).unwrap();
        assert_eq!(decoded.key(), "k");
        assert_eq!(decoded.value(), "v");
    }
}
