use std::fmt;

/// MQTT 5 reason codes shared by CONNACK, PUBACK, PUBREC, PUBREL, PUBCOMP, SUBACK,
/// UNSUBACK, DISCONNECT and AUTH.
///
/// Codes below 0x80 indicate success, codes from 0x80 upwards indicate failure.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901031>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReasonCode {
    /// Success, Normal disconnection or Granted `QoS` 0.
    #[default]
    Success = 0x00,

    /// Granted `QoS` 1.
    GrantedQoS1 = 0x01,

    /// Granted `QoS` 2.
    GrantedQoS2 = 0x02,

    /// The Client wishes to disconnect but requires that the Server also publishes its Will Message.
    DisconnectWithWillMessage = 0x04,

    /// The message is accepted but there are no subscribers.
    NoMatchingSubscribers = 0x10,

    /// No matching Topic Filter is being used by the Client.
    NoSubscriptionExisted = 0x11,

    /// Continue the authentication with another step.
    ContinueAuthentication = 0x18,

    /// Initiate a re-authentication.
    ReAuthenticate = 0x19,

    /// The sender does not wish to reveal the reason, or none of the other Reason Codes apply.
    UnspecifiedError = 0x80,

    /// The received packet does not conform to the protocol.
    MalformedPacket = 0x81,

    /// An unexpected or out of order packet was received.
    ProtocolError = 0x82,

    /// The packet received is valid but cannot be processed by this implementation.
    ImplementationSpecificError = 0x83,

    /// The Server does not support the version of the MQTT protocol requested by the Client.
    UnsupportedProtocolVersion = 0x84,

    /// The Client Identifier is a valid string but is not allowed by the Server.
    ClientIdentifierNotValid = 0x85,

    /// The Server does not accept the User Name or Password specified by the Client.
    BadUserNameOrPassword = 0x86,

    /// The request is not authorized.
    NotAuthorized = 0x87,

    /// The MQTT Server is not available.
    ServerUnavailable = 0x88,

    /// The Server is busy. Try again later.
    ServerBusy = 0x89,

    /// This Client has been banned by administrative action.
    Banned = 0x8A,

    /// The Server is shutting down.
    ServerShuttingDown = 0x8B,

    /// The authentication method is not supported or does not match the method currently in use.
    BadAuthenticationMethod = 0x8C,

    /// No packet has been received for 1.5 times the Keep Alive time.
    KeepAliveTimeout = 0x8D,

    /// Another Connection using the same `ClientID` has connected.
    SessionTakenOver = 0x8E,

    /// The Topic Filter is correctly formed, but is not accepted.
    TopicFilterInvalid = 0x8F,

    /// The Topic Name is correctly formed, but is not accepted.
    TopicNameInvalid = 0x90,

    /// The Packet Identifier is already in use.
    PacketIdentifierInUse = 0x91,

    /// The Packet Identifier is not known.
    PacketIdentifierNotFound = 0x92,

    /// More than Receive Maximum publications are unacknowledged.
    ReceiveMaximumExceeded = 0x93,

    /// The Topic Alias is greater than the allowed maximum.
    TopicAliasInvalid = 0x94,

    /// The packet size is greater than Maximum Packet Size.
    PacketTooLarge = 0x95,

    /// The received data rate is too high.
    MessageRateTooHigh = 0x96,

    /// An implementation or administrative imposed limit has been exceeded.
    QuotaExceeded = 0x97,

    /// The Connection is closed due to an administrative action.
    AdministrativeAction = 0x98,

    /// The payload format does not match the Payload Format Indicator.
    PayloadFormatInvalid = 0x99,

    /// The Server does not support retained messages.
    RetainNotSupported = 0x9A,

    /// The `QoS` is greater than the Maximum `QoS` of the CONNACK.
    QosNotSupported = 0x9B,

    /// The Client should temporarily use another server.
    UseAnotherServer = 0x9C,

    /// The Client should permanently use another server.
    ServerMoved = 0x9D,

    /// The Server does not support Shared Subscriptions.
    SharedSubscriptionsNotSupported = 0x9E,

    /// The connection rate limit has been exceeded.
    ConnectionRateExceeded = 0x9F,

    /// The maximum connection time authorized for this connection has been exceeded.
    MaximumConnectTime = 0xA0,

    /// The Server does not support Subscription Identifiers.
    SubscriptionIdentifiersNotSupported = 0xA1,

    /// The Server does not support Wildcard Subscriptions.
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl ReasonCode {
    /// Converts a numeric value to a `ReasonCode`.
    ///
    /// Returns `None` if the value is not a defined reason code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::GrantedQoS1),
            0x02 => Some(Self::GrantedQoS2),
            0x04 => Some(Self::DisconnectWithWillMessage),
            0x10 => Some(Self::NoMatchingSubscribers),
            0x11 => Some(Self::NoSubscriptionExisted),
            0x18 => Some(Self::ContinueAuthentication),
            0x19 => Some(Self::ReAuthenticate),
            0x80 => Some(Self::UnspecifiedError),
            0x81 => Some(Self::MalformedPacket),
            0x82 => Some(Self::ProtocolError),
            0x83 => Some(Self::ImplementationSpecificError),
            0x84 => Some(Self::UnsupportedProtocolVersion),
            0x85 => Some(Self::ClientIdentifierNotValid),
            0x86 => Some(Self::BadUserNameOrPassword),
            0x87 => Some(Self::NotAuthorized),
            0x88 => Some(Self::ServerUnavailable),
            0x89 => Some(Self::ServerBusy),
            0x8A => Some(Self::Banned),
            0x8B => Some(Self::ServerShuttingDown),
            0x8C => Some(Self::BadAuthenticationMethod),
            0x8D => Some(Self::KeepAliveTimeout),
            0x8E => Some(Self::SessionTakenOver),
            0x8F => Some(Self::TopicFilterInvalid),
            0x90 => Some(Self::TopicNameInvalid),
            0x91 => Some(Self::PacketIdentifierInUse),
            0x92 => Some(Self::PacketIdentifierNotFound),
            0x93 => Some(Self::ReceiveMaximumExceeded),
            0x94 => Some(Self::TopicAliasInvalid),
            0x95 => Some(Self::PacketTooLarge),
            0x96 => Some(Self::MessageRateTooHigh),
            0x97 => Some(Self::QuotaExceeded),
            0x98 => Some(Self::AdministrativeAction),
            0x99 => Some(Self::PayloadFormatInvalid),
            0x9A => Some(Self::RetainNotSupported),
            0x9B => Some(Self::QosNotSupported),
            0x9C => Some(Self::UseAnotherServer),
            0x9D => Some(Self::ServerMoved),
            0x9E => Some(Self::SharedSubscriptionsNotSupported),
            0x9F => Some(Self::ConnectionRateExceeded),
            0xA0 => Some(Self::MaximumConnectTime),
            0xA1 => Some(Self::SubscriptionIdentifiersNotSupported),
            0xA2 => Some(Self::WildcardSubscriptionsNotSupported),
            _ => None,
        }
    }

    /// Converts the `ReasonCode` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether the code reports a failure (0x80 or above).
    pub fn is_failure(self) -> bool {
        self.to_u8() >= 0x80
    }

    /// Maps a CONNACK return code of MQTT 3.1.1 onto the equivalent reason code.
    pub(crate) fn from_v311_connect_return_code(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::UnsupportedProtocolVersion),
            0x02 => Some(Self::ClientIdentifierNotValid),
            0x03 => Some(Self::ServerUnavailable),
            0x04 => Some(Self::BadUserNameOrPassword),
            0x05 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    /// Maps a reason code onto the closest CONNACK return code of MQTT 3.1.1.
    pub(crate) fn to_v311_connect_return_code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::UnsupportedProtocolVersion => 0x01,
            Self::ClientIdentifierNotValid => 0x02,
            Self::BadUserNameOrPassword => 0x04,
            Self::NotAuthorized | Self::Banned => 0x05,
            _ => 0x03,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Success => "Success",
            Self::GrantedQoS1 => "Granted QoS 1",
            Self::GrantedQoS2 => "Granted QoS 2",
            Self::DisconnectWithWillMessage => "Disconnect with will message",
            Self::NoMatchingSubscribers => "No matching subscribers",
            Self::NoSubscriptionExisted => "No subscription existed",
            Self::ContinueAuthentication => "Continue authentication",
            Self::ReAuthenticate => "Re-authenticate",
            Self::UnspecifiedError => "Unspecified error",
            Self::MalformedPacket => "Malformed packet",
            Self::ProtocolError => "Protocol error",
            Self::ImplementationSpecificError => "Implementation specific error",
            Self::UnsupportedProtocolVersion => "Unsupported protocol version",
            Self::ClientIdentifierNotValid => "Client identifier not valid",
            Self::BadUserNameOrPassword => "Bad user name or password",
            Self::NotAuthorized => "Not authorized",
            Self::ServerUnavailable => "Server unavailable",
            Self::ServerBusy => "Server busy",
            Self::Banned => "Banned",
            Self::ServerShuttingDown => "Server shutting down",
            Self::BadAuthenticationMethod => "Bad authentication method",
            Self::KeepAliveTimeout => "Keep alive timeout",
            Self::SessionTakenOver => "Session taken over",
            Self::TopicFilterInvalid => "Topic filter invalid",
            Self::TopicNameInvalid => "Topic name invalid",
            Self::PacketIdentifierInUse => "Packet identifier in use",
            Self::PacketIdentifierNotFound => "Packet identifier not found",
            Self::ReceiveMaximumExceeded => "Receive maximum exceeded",
            Self::TopicAliasInvalid => "Topic alias invalid",
            Self::PacketTooLarge => "Packet too large",
            Self::MessageRateTooHigh => "Message rate too high",
            Self::QuotaExceeded => "Quota exceeded",
            Self::AdministrativeAction => "Administrative action",
            Self::PayloadFormatInvalid => "Payload format invalid",
            Self::RetainNotSupported => "Retain not supported",
            Self::QosNotSupported => "QoS not supported",
            Self::UseAnotherServer => "Use another server",
            Self::ServerMoved => "Server moved",
            Self::SharedSubscriptionsNotSupported => "Shared subscriptions not supported",
            Self::ConnectionRateExceeded => "Connection rate exceeded",
            Self::MaximumConnectTime => "Maximum connect time",
            Self::SubscriptionIdentifiersNotSupported => "Subscription identifiers not supported",
            Self::WildcardSubscriptionsNotSupported => "Wildcard subscriptions not supported",
        };

        write!(f, "{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_start_at_0x80() {
        assert!(!ReasonCode::NoSubscriptionExisted.is_failure());
        assert!(ReasonCode::UnspecifiedError.is_failure());
        assert_eq!(ReasonCode::from_u8(0x03), None);
    }

    #[test]
    fn v311_return_codes_map_both_ways() {
        for code in 0..=5 {
            let reason = ReasonCode::from_v311_connect_return_code(code).unwrap();
            assert_eq!(reason.to_v311_connect_return_code(), code);
        }
        assert_eq!(ReasonCode::from_v311_connect_return_code(6), None);
    }
}
