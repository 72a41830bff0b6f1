// Error types returned by the wire codec.
//
// Decode failures are split along the line the wire spec draws: a
// `MalformedPacket` is a structurally broken byte stream (short read, bad
// UTF-8, an invalid variable-byte integer); a `ProtocolError` is a
// structurally valid packet that violates an MQTT rule (reserved bits set,
// QoS 3, an unknown property id at the negotiated protocol version). Callers
// that only care which of the two happened can match on `DecodeError::kind`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Read past the end of the supplied buffer.
    UnexpectedEof,
    /// A variable byte integer used a 5th continuation byte, or its value
    /// exceeds the 4-byte maximum.
    InvalidVarInt,
    /// The declared remaining length does not match the bytes available.
    InvalidRemainingLength,
    /// Non-UTF-8 bytes where a UTF-8 string was expected.
    InvalidUtf8,
    /// QoS bits decoded to 3.
    InvalidQoS,
    /// Fixed header flag bits that the spec requires to be a fixed value.
    InvalidPacketFlags,
    /// Packet type nibble outside 1..=15, or a type illegal at this protocol
    /// version (e.g. AUTH on MQTT 3.x).
    InvalidPacketType,
    /// Protocol name/level field did not match one of the three supported
    /// revisions.
    InvalidProtocolVersion,
    /// A zero packet id where SUBSCRIBE/UNSUBSCRIBE/PUBLISH(QoS>0) requires
    /// a non-zero one.
    InvalidPacketId,
    /// Property identifier not defined at this protocol version, or a
    /// property repeated more times than the spec allows.
    InvalidPropertyId,
    /// A property decoded to a value its own definition forbids (Maximum QoS
    /// other than 0/1, a zero Subscription Identifier, ...).
    InvalidPropertyValue,
    /// A publish topic contained a wildcard character, or a filter topic
    /// was structurally invalid.
    InvalidTopic,
    /// Reason code byte did not match any of the defined reason codes.
    InvalidReasonCode,
    /// CONNECT protocol name did not match "MQTT" (or "MQIsdp" for 3.1).
    InvalidProtocolName,
    /// Connect flags combination the spec forbids (reserved bit set, has
    /// password without username, will-qos/retain set without will flag).
    InvalidConnectFlags,
    /// Zero-length client id with `CleanSession`/`CleanStart` unset.
    InvalidClientId,
    /// SUBSCRIBE/UNSUBSCRIBE payload contained no topic filters.
    EmptyPayload,
}

impl DecodeError {
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::InvalidQoS
            | Self::InvalidPacketFlags
            | Self::InvalidPacketType
            | Self::InvalidPropertyId
            | Self::InvalidPropertyValue
            | Self::InvalidReasonCode
            | Self::InvalidConnectFlags
            | Self::EmptyPayload => ErrorKind::Protocol,
            Self::UnexpectedEof
            | Self::InvalidVarInt
            | Self::InvalidRemainingLength
            | Self::InvalidUtf8
            | Self::InvalidProtocolVersion
            | Self::InvalidPacketId
            | Self::InvalidTopic
            | Self::InvalidProtocolName
            | Self::InvalidClientId => ErrorKind::Malformed,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::UnexpectedEof => "unexpected end of packet",
            Self::InvalidVarInt => "invalid variable byte integer",
            Self::InvalidRemainingLength => "remaining length does not match packet body",
            Self::InvalidUtf8 => "invalid utf-8 string",
            Self::InvalidQoS => "invalid qos value",
            Self::InvalidPacketFlags => "invalid fixed header flags",
            Self::InvalidPacketType => "invalid or unsupported packet type",
            Self::InvalidProtocolVersion => "invalid protocol name or level",
            Self::InvalidPacketId => "invalid packet identifier",
            Self::InvalidPropertyId => "invalid or unknown property identifier",
            Self::InvalidPropertyValue => "property value violates its own definition",
            Self::InvalidTopic => "invalid topic",
            Self::InvalidReasonCode => "invalid reason code",
            Self::InvalidProtocolName => "invalid protocol name",
            Self::InvalidConnectFlags => "invalid combination of connect flags",
            Self::InvalidClientId => "invalid client identifier",
            Self::EmptyPayload => "subscribe/unsubscribe packet carried no topic filters",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The variable byte integer representing packet length overflowed the
    /// 4-byte/256MB limit.
    InvalidVarInt,
    /// A string or binary field exceeded the 16-bit length prefix.
    TooManyData,
    /// The dup flag was set on a QoS 0 publish, or some other combination
    /// the spec forbids was requested.
    InvalidPacketFlags,
    /// Encoded packet size exceeds the caller-supplied cap (broker's
    /// Maximum Packet Size, or a local buffer cap).
    PacketTooLarge,
    /// A publish topic contained a wildcard character.
    InvalidTopic,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidVarInt => "packet length exceeds the variable byte integer range",
            Self::TooManyData => "field exceeds 65535 bytes",
            Self::InvalidPacketFlags => "invalid combination of packet flags",
            Self::PacketTooLarge => "encoded packet exceeds the configured size limit",
            Self::InvalidTopic => "invalid topic",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(_: std::io::Error) -> Self {
        // `Vec<u8>` writes are infallible in practice; keep the `?` ergonomics
        // for the byteorder `WriteBytesExt` calls without pretending I/O can
        // actually fail against an in-memory buffer.
        Self::TooManyData
    }
}
