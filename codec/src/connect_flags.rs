// Connect Flags byte (MQTT 3.1/3.1.1 section 3.1.2.3, MQTT 5 section 3.1.2.3).
//
//         7               6              5          4-3          2               1             0
// +---------------+---------------+-------------+----------+-----------+---------------+----------+
// | Username Flag | Password Flag | Will Retain | Will QoS | Will Flag | Clean Start/Sess| Reserved |
// +---------------+---------------+-------------+----------+-----------+---------------+----------+

use crate::base::{DecodePacket, EncodePacket, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectFlags {
    has_username: bool,
    has_password: bool,
    will_retain: bool,
    will_qos: QoS,
    will: bool,
    /// Named `clean_start` to match MQTT 5 vocabulary; carries the same bit
    /// and meaning as 3.1.1's Clean Session flag.
    clean_start: bool,
}

impl ConnectFlags {
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }

    #[must_use]
    pub const fn new(clean_start: bool) -> Self {
        Self {
            has_username: false,
            has_password: false,
            will_retain: false,
            will_qos: QoS::AtMostOnce,
            will: false,
            clean_start,
        }
    }

    #[must_use]
    pub const fn has_username(&self) -> bool {
        self.has_username
    }

    pub fn set_has_username(&mut self, v: bool) -> &mut Self {
        self.has_username = v;
        self
    }

    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.has_password
    }

    pub fn set_has_password(&mut self, v: bool) -> &mut Self {
        self.has_password = v;
        self
    }

    #[must_use]
    pub const fn will_retain(&self) -> bool {
        self.will_retain
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.will_qos
    }

    #[must_use]
    pub const fn will(&self) -> bool {
        self.will
    }

    pub fn set_will(&mut self, will: bool, qos: QoS, retain: bool) -> &mut Self {
        self.will = will;
        if will {
            self.will_qos = qos;
            self.will_retain = retain;
        } else {
            self.will_qos = QoS::AtMostOnce;
            self.will_retain = false;
        }
        self
    }

    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }
}

impl Default for ConnectFlags {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EncodePacket for ConnectFlags {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let has_username = u8::from(self.has_username) << 7;
        let has_password = u8::from(self.has_password) << 6;
        let will_retain = u8::from(self.will_retain) << 5;
        let will_qos = u8::from(self.will_qos) << 3;
        let will = u8::from(self.will) << 2;
        let clean_start = u8::from(self.clean_start) << 1;
        buf.push(has_username | has_password | will_retain | will_qos | will | clean_start);
        Ok(1)
    }
}

impl DecodePacket for ConnectFlags {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flags = ba.read_byte()?;
        let has_username = flags & 0b1000_0000 != 0;
        let has_password = flags & 0b0100_0000 != 0;
        let will_retain = flags & 0b0010_0000 != 0;
        let will_qos = QoS::try_from((flags & 0b0001_1000) >> 3)?;
        let will = flags & 0b0000_0100 != 0;
        let clean_start = flags & 0b0000_0010 != 0;

        // Reserved bit 0 MUST be zero [MQTT-3.1.2-3].
        if flags & 0b0000_0001 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        // If Will Flag is 0, Will QoS and Will Retain MUST also be 0 [MQTT-3.1.2-11].
        if !will && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(DecodeError::InvalidConnectFlags);
        }
        // If User Name Flag is 0, Password Flag MUST be 0 [MQTT-3.1.2-22].
        if !has_username && has_password {
            return Err(DecodeError::InvalidConnectFlags);
        }

        Ok(Self { has_username, has_password, will_retain, will_qos, will, clean_start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let mut flags = ConnectFlags::new(true);
        flags.set_will(true, QoS::ExactlyOnce, true);
        flags.set_has_username(true);
        let mut buf = Vec::new();
        flags.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectFlags::decode(&mut ba).unwrap();
        assert_eq!(decoded, flags);
    }

    #[test]
    fn rejects_reserved_bit() {
        let buf = [0b0000_0001];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectFlags::decode(&mut ba), Err(DecodeError::InvalidConnectFlags));
    }
}
