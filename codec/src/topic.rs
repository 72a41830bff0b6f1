// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.
//
// Structural validation only: is this byte sequence a legal topic name or
// filter on the wire. Matching a filter against a name, and any policy about
// what topics "mean", is explicitly out of scope (see spec Non-goals).

use byteorder::{BigEndian, WriteBytesExt};

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

fn check_len(s: &str) -> Result<(), EncodeError> {
    if s.is_empty() || s.len() > u16::MAX as usize {
        return Err(EncodeError::InvalidTopic);
    }
    Ok(())
}

fn encode_str(s: &str, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
    #[allow(clippy::cast_possible_truncation)]
    buf.write_u16::<BigEndian>(s.len() as u16)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(2 + s.len())
}

/// A topic name used in a PUBLISH packet. MUST NOT contain the wildcard
/// characters `+` or `#` [MQTT-3.3.2-2].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct PubTopic(String);

impl PubTopic {
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        check_len(topic)?;
        if topic.contains(['+', '#']) {
            return Err(EncodeError::InvalidTopic);
        }
        Ok(Self(topic.to_string()))
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

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = ba.read_string()?;
        if s.is_empty() || s.contains(['+', '#']) {
            return Err(DecodeError::InvalidTopic);
        }
        Ok(Self(s))
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        encode_str(&self.0, buf)
    }
}

/// A topic filter used in SUBSCRIBE/UNSUBSCRIBE. May contain `+`
/// (single-level wildcard) and `#` (multi-level wildcard, only as the final
/// level) [MQTT-4.7.1-2].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(filter: &str) -> Result<Self, EncodeError> {
        check_len(filter)?;
        Self::validate(filter).map_err(|_| EncodeError::InvalidTopic)?;
        Ok(Self(filter.to_string()))
    }

    fn validate(filter: &str) -> Result<(), ()> {
        let levels: Vec<&str> = filter.split('/').collect();
        for (idx, level) in levels.iter().enumerate() {
            if level.contains('#') && (*level != "#" || idx != levels.len() - 1) {
                return Err(());
            }
            if level.contains('+') && *level != "+" {
                return Err(());
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.0.starts_with("$share/")
    }
}

impl AsRef<str> for TopicFilter {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for TopicFilter {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = ba.read_string()?;
        Self::validate(&s).map_err(|()| DecodeError::InvalidTopic)?;
        Ok(Self(s))
    }
}

impl EncodePacket for TopicFilter {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        encode_str(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_topic_rejects_wildcards() {
        assert!(PubTopic::new("a/b").is_ok());
        assert!(PubTopic::new("a/+").is_err());
        assert!(PubTopic::new("a/#").is_err());
        assert!(PubTopic::new("").is_err());
    }

    #[test]
    fn filter_accepts_wildcards_in_legal_positions() {
        assert!(TopicFilter::new("a/+/c").is_ok());
        assert!(TopicFilter::new("a/b/#").is_ok());
        assert!(TopicFilter::new("a/#/c").is_err());
        assert!(TopicFilter::new("a/b+").is_err());
    }
}
