// MQTT 5 properties (section 2.2.2.2 and the per-property tables in
// section 3). Properties only appear when the negotiated protocol version
// is V5; v3.1/v3.1.1 packets never carry a `Properties` list.

use crate::base::{DecodePacket, EncodePacket, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::primitive::{BinaryData, BoolData, StringData, StringPairData, U16Data, U32Data};
use crate::topic::PubTopic;
use crate::var_int::VarInt;

/// Properties allowed to repeat within the same property list; every other
/// property is a protocol error the second time it appears.
pub const REPEATABLE_PROPERTIES: &[PropertyType] =
    &[PropertyType::UserProperty, PropertyType::SubscriptionIdentifier];

/// Rejects a property list containing more than one Subscription Identifier,
/// which PUBLISH allows to repeat for User Property but not for this one.
pub fn check_multiple_subscription_identifiers(
    properties: &[Property],
) -> Result<(), PropertyType> {
    let count = properties
        .iter()
        .filter(|p| p.property_type() == PropertyType::SubscriptionIdentifier)
        .count();
    if count > 1 {
        return Err(PropertyType::SubscriptionIdentifier);
    }
    Ok(())
}

/// Rejects a property list containing a property id not legal on this
/// packet type, or a non-repeatable property id appearing more than once.
pub fn check_property_type_list(
    properties: &[Property],
    allowed: &[PropertyType],
) -> Result<(), PropertyType> {
    for property in properties {
        if !allowed.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }
    for property_type in allowed {
        let count = properties.iter().filter(|p| p.property_type() == *property_type).count();
        if count > 1 && !REPEATABLE_PROPERTIES.contains(property_type) {
            return Err(*property_type);
        }
    }
    Ok(())
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyId),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    PayloadFormatIndicator(BoolData),
    MessageExpiryInterval(U32Data),
    ContentType(StringData),
    ResponseTopic(PubTopic),
    CorrelationData(BinaryData),
    /// Value of 1 to 268,435,455; 0 is a protocol error [MQTT-3.3.4-?].
    SubscriptionIdentifier(VarInt),
    SessionExpiryInterval(U32Data),
    AssignedClientIdentifier(StringData),
    ServerKeepAlive(U16Data),
    AuthenticationMethod(StringData),
    AuthenticationData(BinaryData),
    RequestProblemInformation(BoolData),
    WillDelayInterval(U32Data),
    RequestResponseInformation(BoolData),
    ResponseInformation(StringData),
    ServerReference(StringData),
    ReasonString(StringData),
    ReceiveMaximum(U16Data),
    TopicAliasMaximum(U16Data),
    TopicAlias(U16Data),
    /// 0 or 1 only.
    MaximumQoS(QoS),
    RetainAvailable(BoolData),
    UserProperty(StringPairData),
    MaximumPacketSize(U32Data),
    WildcardSubscriptionAvailable(BoolData),
    SubscriptionIdentifierAvailable(BoolData),
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::AssignedClientIdentifier(v) => v.bytes(),
            Self::AuthenticationData(v) => v.bytes(),
            Self::AuthenticationMethod(v) => v.bytes(),
            Self::ContentType(v) => v.bytes(),
            Self::CorrelationData(v) => v.bytes(),
            Self::MaximumPacketSize(_) => U32Data::bytes(),
            Self::MaximumQoS(_) => 1,
            Self::MessageExpiryInterval(_) => U32Data::bytes(),
            Self::PayloadFormatIndicator(_) => BoolData::bytes(),
            Self::ReasonString(v) => v.bytes(),
            Self::ReceiveMaximum(_) => U16Data::bytes(),
            Self::RequestProblemInformation(_) => BoolData::bytes(),
            Self::RequestResponseInformation(_) => BoolData::bytes(),
            Self::ResponseInformation(v) => v.bytes(),
            Self::ResponseTopic(v) => v.bytes(),
            Self::RetainAvailable(_) => BoolData::bytes(),
            Self::ServerKeepAlive(_) => U16Data::bytes(),
            Self::ServerReference(v) => v.bytes(),
            Self::SessionExpiryInterval(_) => U32Data::bytes(),
            Self::SharedSubscriptionAvailable(_) => BoolData::bytes(),
            Self::SubscriptionIdentifier(v) => v.bytes(),
            Self::SubscriptionIdentifierAvailable(_) => BoolData::bytes(),
            Self::TopicAlias(_) => U16Data::bytes(),
            Self::TopicAliasMaximum(_) => U16Data::bytes(),
            Self::UserProperty(v) => v.bytes(),
            Self::WildcardSubscriptionAvailable(_) => BoolData::bytes(),
            Self::WillDelayInterval(_) => U32Data::bytes(),
        };
        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    #[allow(clippy::too_many_lines)]
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(ba.read_byte()?)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(PubTopic::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::AssignedClientIdentifier => {
                Ok(Self::AssignedClientIdentifier(StringData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(BoolData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(U32Data::decode(ba)?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(BoolData::decode(ba)?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => {
                let max = U16Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(max))
            }
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAlias => {
                let alias = U16Data::decode(ba)?;
                if alias.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::TopicAlias(alias))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::try_from(ba.read_byte()?)?;
                if qos == QoS::ExactlyOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                let max = U32Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(max))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Ok(Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::AssignedClientIdentifier(v) => v.encode(buf)?,
            Self::AuthenticationData(v) => v.encode(buf)?,
            Self::AuthenticationMethod(v) => v.encode(buf)?,
            Self::ContentType(v) => v.encode(buf)?,
            Self::CorrelationData(v) => v.encode(buf)?,
            Self::MaximumPacketSize(v) => v.encode(buf)?,
            Self::MaximumQoS(qos) => {
                buf.push(u8::from(*qos));
                1
            }
            Self::MessageExpiryInterval(v) => v.encode(buf)?,
            Self::PayloadFormatIndicator(v) => v.encode(buf)?,
            Self::ReasonString(v) => v.encode(buf)?,
            Self::ReceiveMaximum(v) => v.encode(buf)?,
            Self::RequestProblemInformation(v) => v.encode(buf)?,
            Self::RequestResponseInformation(v) => v.encode(buf)?,
            Self::ResponseInformation(v) => v.encode(buf)?,
            Self::ResponseTopic(v) => v.encode(buf)?,
            Self::RetainAvailable(v) => v.encode(buf)?,
            Self::ServerKeepAlive(v) => v.encode(buf)?,
            Self::ServerReference(v) => v.encode(buf)?,
            Self::SessionExpiryInterval(v) => v.encode(buf)?,
            Self::SharedSubscriptionAvailable(v) => v.encode(buf)?,
            Self::SubscriptionIdentifier(v) => v.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(v) => v.encode(buf)?,
            Self::TopicAlias(v) => v.encode(buf)?,
            Self::TopicAliasMaximum(v) => v.encode(buf)?,
            Self::UserProperty(v) => v.encode(buf)?,
            Self::WildcardSubscriptionAvailable(v) => v.encode(buf)?,
            Self::WillDelayInterval(v) => v.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// An ordered list of properties, VBI-length-prefixed on the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        let body: usize = self.0.iter().map(Property::bytes).sum();
        VarInt::new(body as u32).map_or(0, VarInt::bytes) + body
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Property] {
        &self.0
    }

    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }
}

impl AsRef<[Property]> for Properties {
    fn as_ref(&self) -> &[Property] {
        &self.0
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        if ba.remaining_bytes() == 0 {
            return Ok(Self::new());
        }
        let mut remaining = VarInt::decode(ba)?.value() as usize;
        let mut properties = Vec::new();
        while remaining > 0 {
            let property = Property::decode(ba)?;
            remaining = remaining.checked_sub(property.bytes()).ok_or(DecodeError::InvalidVarInt)?;
            properties.push(property);
        }
        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let body: usize = self.0.iter().map(Property::bytes).sum();
        let len = VarInt::try_from(body)?;
        let mut written = len.bytes();
        len.encode(buf)?;
        for property in &self.0 {
            written += property.encode(buf)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_roundtrips() {
        let props = Properties::new();
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x00]);
    }

    #[test]
    fn session_expiry_roundtrips() {
        let mut props = Properties::new();
        props.push(Property::SessionExpiryInterval(U32Data::new(3600)));
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.as_slice()[0].property_type(), PropertyType::SessionExpiryInterval);
    }

    #[test]
    fn rejects_zero_topic_alias() {
        let buf = [0x02, 0x23, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(Properties::decode(&mut ba), Err(DecodeError::InvalidPropertyValue));
    }

    #[test]
    fn rejects_property_not_in_allowed_list() {
        let mut props = Vec::new();
        props.push(Property::TopicAlias(U16Data::new(1)));
        assert_eq!(
            check_property_type_list(&props, &[PropertyType::SessionExpiryInterval]),
            Err(PropertyType::TopicAlias)
        );
    }
}
