//! Error taxonomy of the protocol engine.

use std::{borrow::Cow, fmt, io};

use thiserror::Error;

use crate::protocol::{PacketType, ProtocolVersion, ReasonCode};

/// Caller input that cannot be put on the wire. Reported before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Value {0} exceeds the variable byte integer maximum")]
    ValueTooLarge(u64),

    #[error("String of {0} bytes exceeds the maximum of 65535 bytes")]
    StringTooLong(usize),

    #[error("{kind} packets cannot be sent with protocol version {version}")]
    UnsupportedPacket { kind: PacketType, version: ProtocolVersion },
}

/// Inbound bytes that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodingError {
    /// More bytes are needed. Never reported to callers, the frame reader waits instead.
    #[error("Truncated input")]
    Truncated,

    #[error("Malformed variable byte integer")]
    MalformedVarInt,

    #[error("String is not valid UTF-8")]
    MalformedString,

    #[error("Malformed property: {0}")]
    MalformedProperty(Cow<'static, str>),

    #[error("Unknown packet type: {0}")]
    UnknownPacketKind(u8),
}

/// The broker violated the protocol. Carries a machine readable reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: ReasonCode,
    pub message: Cow<'static, str>,
}

impl ProtocolError {
    pub fn new(code: ReasonCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self { code, message: message.into() }
    }

    pub(crate) fn malformed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ReasonCode::MalformedPacket, message)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProtocolError {}

/// Failure while turning inbound bytes into a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error(transparent)]
    Decoding(#[from] DecodingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl PacketError {
    /// Whether the input simply ended early and more bytes should be awaited.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Decoding(DecodingError::Truncated))
    }
}

/// A request breaks a local rule or a capability the broker advertised. It is never sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid topic filter: {0:?}")]
    InvalidTopicFilter(String),

    #[error("Invalid topic name: {0:?}")]
    InvalidTopicName(String),

    #[error("At least one topic filter is required")]
    NoTopicFilters,

    #[error("Subscription identifier must be between 1 and 268435455, got {0}")]
    InvalidSubscriptionIdentifier(u32),

    #[error("Invalid UTF-8 string in {0}")]
    InvalidString(&'static str),

    #[error("The broker does not support subscription identifiers")]
    SubscriptionIdentifiersNotSupported,

    #[error("The broker does not support wildcard subscriptions")]
    WildcardSubscriptionsNotSupported,

    #[error("The broker does not support shared subscriptions")]
    SharedSubscriptionsNotSupported,

    #[error("The broker does not support retained messages")]
    RetainNotSupported,

    #[error("The broker supports at most {0}")]
    QosNotSupported(crate::protocol::QoS),

    #[error("Packet of {size} bytes exceeds the broker maximum packet size of {maximum} bytes")]
    PacketTooLarge { size: usize, maximum: u32 },
}

/// Returned by a packet identifier allocator when every identifier is in use.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("All packet identifiers are in use")]
pub struct AllocatorExhausted;

/// Terminal failure of a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    AllocatorExhausted(#[from] AllocatorExhausted),

    #[error("Timed out waiting for {0}")]
    Timeout(PacketType),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection refused: {0}")]
    ConnectionRefused(ReasonCode),

    #[error("Rejected by the broker: {0}")]
    Rejected(ReasonCode),
}

/// Failure of the tokio connection driver.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Connection reset by peer")]
    ConnectionReset,
}
