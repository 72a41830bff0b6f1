// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

mod base;
mod byte_array;
mod connect_flags;
mod error;
mod header;
mod packet;
mod primitive;
mod property;
mod reason_code;
mod topic;
mod var_int;

pub use base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion, QoS};
pub use byte_array::ByteArray;
pub use connect_flags::ConnectFlags;
pub use error::{DecodeError, EncodeError, ErrorKind};
pub use header::{FixedHeader, Packet, PacketType};
pub use packet::{
    AuthPacket, ConnectAckPacket, ConnectAckReason, ConnectPacket, ConnectReturnCode,
    DisconnectPacket, PingRequestPacket, PingResponsePacket, PublishAckPacket,
    PublishCompletePacket, PublishPacket, PublishReceivedPacket, PublishReleasePacket,
    RetainHandling, SubscribeAckPacket, SubscribePacket, SubscribeTopic, UnsubscribeAckPacket,
    UnsubscribePacket, Will, AUTH_PROPERTIES, AUTH_REASONS, DISCONNECT_PROPERTIES,
    DISCONNECT_REASONS, PUBLISH_ACK_PROPERTIES, PUBLISH_ACK_REASONS,
    PUBLISH_COMPLETE_PROPERTIES, PUBLISH_COMPLETE_REASONS, PUBLISH_RECEIVED_PROPERTIES,
    PUBLISH_RECEIVED_REASONS, PUBLISH_RELEASE_PROPERTIES, PUBLISH_RELEASE_REASONS,
    SUBSCRIBE_ACK_PROPERTIES, SUBSCRIBE_ACK_REASONS, SUBSCRIBE_PROPERTIES,
    UNSUBSCRIBE_ACK_PROPERTIES, UNSUBSCRIBE_ACK_REASONS, UNSUBSCRIBE_PROPERTIES,
};
pub use primitive::{BinaryData, BoolData, StringData, StringPairData, U16Data, U32Data};
pub use property::{Properties, Property, PropertyType};
pub use reason_code::ReasonCode;
pub use topic::{PubTopic, TopicFilter};
pub use var_int::VarInt;
