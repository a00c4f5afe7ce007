use std::fmt;

pub mod packet_type;
pub mod reason_code;
pub mod validation;

pub use packet_type::PacketType;
pub use reason_code::ReasonCode;

/// Revision of the MQTT protocol negotiated for a connection.
///
/// The discriminant is the "Protocol Level" byte carried by CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// MQTT 3.1.1.
    V311 = 4,

    /// MQTT 5.0.
    V5 = 5,
}

impl ProtocolVersion {
    /// Converts a protocol level byte to a `ProtocolVersion`.
    ///
    /// Returns `None` for levels this client does not speak.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(Self::V311),
            5 => Some(Self::V5),
            _ => None,
        }
    }

    /// Converts the `ProtocolVersion` to its protocol level byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether packets of this version carry a properties block.
    pub fn has_properties(self) -> bool {
        self >= Self::V5
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V311 => write!(f, "3.1.1"),
            Self::V5 => write!(f, "5.0"),
        }
    }
}

/// Quality of Service level of a publication or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,

    /// At least once delivery.
    AtLeastOnce = 1,

    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Converts a numeric value to a `QoS`.
    ///
    /// Returns `None` for the reserved value 3 and anything above.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    /// Converts the `QoS` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS {}", self.to_u8())
    }
}
