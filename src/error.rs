// Error kinds surfaced to callers and callbacks (spec section 7). Decode and
// encode failures from the wire codec fold in via `From`; everything else is
// raised directly by the engine, persistence layer or transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] codec::DecodeError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("broker refused connection: {0:?}")]
    ConnectionRefused(String),

    #[error("operation attempted while not connected")]
    Disconnected,

    #[error("too many in-flight messages")]
    TooManyInFlight,

    #[error("encoded packet exceeds the configured size limit")]
    PacketTooLarge,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation canceled")]
    OperationCanceled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<codec::EncodeError> for ClientError {
    fn from(err: codec::EncodeError) -> Self {
        match err {
            codec::EncodeError::PacketTooLarge => Self::PacketTooLarge,
            other => Self::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
