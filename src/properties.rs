//! MQTT 5 properties.
//!
//! Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901027>

use bytes::{Buf, Bytes, BytesMut};

use crate::{
    codec::{
        length_field, read_binary_data, read_u16, read_u32, read_u8, read_utf8_string,
        read_utf8_string_pair, read_variable_byte_int, Encoder, SizeCounter,
    },
    constants::*,
    error::{DecodingError, EncodingError},
};

/// A user property, an application defined name/value pair.
///
/// The same name may appear several times; order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserProperty {
    pub name: String,
    pub value: String,
}

impl UserProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// The properties block of an MQTT 5 packet.
///
/// Every property is optional. Which ones a packet may carry is up to the packet;
/// the block itself serializes whatever is present, in ascending identifier order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// 0x01: whether the payload is UTF-8 encoded character data.
    pub payload_format_indicator: Option<u8>,

    /// 0x02: lifetime of the application message in seconds.
    pub message_expiry_interval: Option<u32>,

    /// 0x03: content type of the application message.
    pub content_type: Option<String>,

    /// 0x08: topic name for a response message.
    pub response_topic: Option<String>,

    /// 0x09: correlates a response message with its request.
    pub correlation_data: Option<Bytes>,

    /// 0x0B: subscription identifiers. SUBSCRIBE carries at most one, PUBLISH may carry several.
    pub subscription_identifiers: Vec<u32>,

    /// 0x11: session expiry interval in seconds.
    pub session_expiry_interval: Option<u32>,

    /// 0x12: client identifier assigned by the server.
    pub assigned_client_identifier: Option<String>,

    /// 0x13: keep alive the server wants the client to use.
    pub server_keep_alive: Option<u16>,

    /// 0x15: name of the authentication method.
    pub authentication_method: Option<String>,

    /// 0x16: authentication data, defined by the authentication method.
    pub authentication_data: Option<Bytes>,

    /// 0x17: whether reason strings and user properties may be sent on failures.
    pub request_problem_information: Option<u8>,

    /// 0x18: delay in seconds before the will message is published.
    pub will_delay_interval: Option<u32>,

    /// 0x19: asks the server for response information in the CONNACK.
    pub request_response_information: Option<u8>,

    /// 0x1A: basis for creating a response topic.
    pub response_information: Option<String>,

    /// 0x1C: another server the client can use.
    pub server_reference: Option<String>,

    /// 0x1F: human readable diagnostics, not meant to be parsed.
    pub reason_string: Option<String>,

    /// 0x21: number of unacknowledged `QoS` 1 and 2 publications the sender accepts.
    pub receive_maximum: Option<u16>,

    /// 0x22: highest topic alias the sender accepts.
    pub topic_alias_maximum: Option<u16>,

    /// 0x23: topic alias replacing the topic name.
    pub topic_alias: Option<u16>,

    /// 0x24: highest `QoS` the server supports.
    pub maximum_qos: Option<u8>,

    /// 0x25: whether the server supports retained messages.
    pub retain_available: Option<u8>,

    /// 0x26: user properties.
    pub user_properties: Vec<UserProperty>,

    /// 0x27: largest packet the sender accepts.
    pub maximum_packet_size: Option<u32>,

    /// 0x28: whether the server supports wildcard subscriptions.
    pub wildcard_subscription_available: Option<u8>,

    /// 0x29: whether the server supports subscription identifiers.
    pub subscription_identifiers_available: Option<u8>,

    /// 0x2A: whether the server supports shared subscriptions.
    pub shared_subscription_available: Option<u8>,
}

impl Properties {
    /// Properties carrying only the given user properties.
    pub fn with_user_properties(user_properties: Vec<UserProperty>) -> Self {
        Self { user_properties, ..Self::default() }
    }

    /// Whether no property is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Byte count of the properties without the leading length field.
    fn body_size(&self) -> usize {
        SizeCounter::measure(|out| self.write_body(out))
    }

    /// Byte count of the whole block, length field included.
    pub fn size(&self) -> usize {
        SizeCounter::measure(|out| self.write(out))
    }

    /// Serialize the block, length field included, into `buf`.
    ///
    /// # Errors
    /// - Returns an `EncodingError` if a string, binary value or the block itself is too long.
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<(), EncodingError> {
        self.write(buf)
    }

    pub(crate) fn write<E: Encoder>(&self, out: &mut E) -> Result<(), E::Error> {
        out.put_variable_byte_int(length_field(self.body_size()))?;
        self.write_body(out)
    }

    fn write_body<E: Encoder>(&self, out: &mut E) -> Result<(), E::Error> {
        if let Some(value) = self.payload_format_indicator {
            out.put_byte(PAYLOAD_FORMAT_INDICATOR_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = self.message_expiry_interval {
            out.put_byte(MESSAGE_EXPIRY_INTERVAL_IDENTIFIER);
            out.put_four_byte_int(value);
        }

        if let Some(value) = &self.content_type {
            out.put_byte(CONTENT_TYPE_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = &self.response_topic {
            out.put_byte(RESPONSE_TOPIC_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = &self.correlation_data {
            out.put_byte(CORRELATION_DATA_IDENTIFIER);
            out.put_binary_data(value)?;
        }

        for &value in &self.subscription_identifiers {
            out.put_byte(SUBSCRIPTION_IDENTIFIER_IDENTIFIER);
            out.put_variable_byte_int(value)?;
        }

        if let Some(value) = self.session_expiry_interval {
            out.put_byte(SESSION_EXPIRY_INTERVAL_IDENTIFIER);
            out.put_four_byte_int(value);
        }

        if let Some(value) = &self.assigned_client_identifier {
            out.put_byte(ASSIGNED_CLIENT_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = self.server_keep_alive {
            out.put_byte(SERVER_KEEP_ALIVE_IDENTIFIER);
            out.put_two_byte_int(value);
        }

        if let Some(value) = &self.authentication_method {
            out.put_byte(AUTHENTICATION_METHOD_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = &self.authentication_data {
            out.put_byte(AUTHENTICATION_DATA_IDENTIFIER);
            out.put_binary_data(value)?;
        }

        if let Some(value) = self.request_problem_information {
            out.put_byte(REQUEST_PROBLEM_INFORMATION_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = self.will_delay_interval {
            out.put_byte(WILL_DELAY_INTERVAL_IDENTIFIER);
            out.put_four_byte_int(value);
        }

        if let Some(value) = self.request_response_information {
            out.put_byte(REQUEST_RESPONSE_INFORMATION_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = &self.response_information {
            out.put_byte(RESPONSE_INFORMATION_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = &self.server_reference {
            out.put_byte(SERVER_REFERENCE_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = &self.reason_string {
            out.put_byte(REASON_STRING_IDENTIFIER);
            out.put_utf8_string(value)?;
        }

        if let Some(value) = self.receive_maximum {
            out.put_byte(RECEIVE_MAXIMUM_IDENTIFIER);
            out.put_two_byte_int(value);
        }

        if let Some(value) = self.topic_alias_maximum {
            out.put_byte(TOPIC_ALIAS_MAXIMUM_IDENTIFIER);
            out.put_two_byte_int(value);
        }

        if let Some(value) = self.topic_alias {
            out.put_byte(TOPIC_ALIAS_IDENTIFIER);
            out.put_two_byte_int(value);
        }

        if let Some(value) = self.maximum_qos {
            out.put_byte(MAXIMUM_QOS_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = self.retain_available {
            out.put_byte(RETAIN_AVAILABLE_IDENTIFIER);
            out.put_byte(value);
        }

        for user_property in &self.user_properties {
            out.put_byte(USER_PROPERTY_IDENTIFIER);
            out.put_utf8_string_pair(&user_property.name, &user_property.value)?;
        }

        if let Some(value) = self.maximum_packet_size {
            out.put_byte(MAXIMUM_PACKET_SIZE_IDENTIFIER);
            out.put_four_byte_int(value);
        }

        if let Some(value) = self.wildcard_subscription_available {
            out.put_byte(WILDCARD_SUBSCRIPTION_AVAILABLE_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = self.subscription_identifiers_available {
            out.put_byte(SUBSCRIPTION_IDENTIFIERS_AVAILABLE_IDENTIFIER);
            out.put_byte(value);
        }

        if let Some(value) = self.shared_subscription_available {
            out.put_byte(SHARED_SUBSCRIPTION_AVAILABLE_IDENTIFIER);
            out.put_byte(value);
        }

        Ok(())
    }

    /// Parse a properties block, length field included, from the front of `buf`.
    ///
    /// # Errors
    /// - Returns `DecodingError::MalformedProperty` for unknown or duplicated identifiers,
    ///   values running past the declared length, or a length running past the buffer.
    pub fn parse(buf: &mut Bytes) -> Result<Self, DecodingError> {
        let len = read_variable_byte_int(buf).map_err(|e| match e {
            DecodingError::Truncated => malformed("property length is truncated"),
            e => e,
        })? as usize;

        if len > buf.remaining() {
            return Err(malformed("property length exceeds the packet"));
        }

        let mut block = buf.split_to(len);
        let mut properties = Self::default();

        while block.has_remaining() {
            properties.parse_one(&mut block).map_err(|e| match e {
                DecodingError::Truncated => malformed("property value is truncated"),
                e => e,
            })?;
        }

        Ok(properties)
    }

    fn parse_one(&mut self, buf: &mut Bytes) -> Result<(), DecodingError> {
        let identifier = read_variable_byte_int(buf)?;
        let Ok(identifier) = u8::try_from(identifier) else {
            return Err(malformed("unknown property identifier"));
        };

        match identifier {
            PAYLOAD_FORMAT_INDICATOR_IDENTIFIER => {
                set_once(&mut self.payload_format_indicator, read_u8(buf)?)
            }
            MESSAGE_EXPIRY_INTERVAL_IDENTIFIER => {
                set_once(&mut self.message_expiry_interval, read_u32(buf)?)
            }
            CONTENT_TYPE_IDENTIFIER => set_once(&mut self.content_type, read_utf8_string(buf)?),
            RESPONSE_TOPIC_IDENTIFIER => {
                set_once(&mut self.response_topic, read_utf8_string(buf)?)
            }
            CORRELATION_DATA_IDENTIFIER => {
                set_once(&mut self.correlation_data, read_binary_data(buf)?)
            }
            SUBSCRIPTION_IDENTIFIER_IDENTIFIER => {
                self.subscription_identifiers.push(read_variable_byte_int(buf)?);
                Ok(())
            }
            SESSION_EXPIRY_INTERVAL_IDENTIFIER => {
                set_once(&mut self.session_expiry_interval, read_u32(buf)?)
            }
            ASSIGNED_CLIENT_IDENTIFIER => {
                set_once(&mut self.assigned_client_identifier, read_utf8_string(buf)?)
            }
            SERVER_KEEP_ALIVE_IDENTIFIER => set_once(&mut self.server_keep_alive, read_u16(buf)?),
            AUTHENTICATION_METHOD_IDENTIFIER => {
                set_once(&mut self.authentication_method, read_utf8_string(buf)?)
            }
            AUTHENTICATION_DATA_IDENTIFIER => {
                set_once(&mut self.authentication_data, read_binary_data(buf)?)
            }
            REQUEST_PROBLEM_INFORMATION_IDENTIFIER => {
                set_once(&mut self.request_problem_information, read_u8(buf)?)
            }
            WILL_DELAY_INTERVAL_IDENTIFIER => {
                set_once(&mut self.will_delay_interval, read_u32(buf)?)
            }
            REQUEST_RESPONSE_INFORMATION_IDENTIFIER => {
                set_once(&mut self.request_response_information, read_u8(buf)?)
            }
            RESPONSE_INFORMATION_IDENTIFIER => {
                set_once(&mut self.response_information, read_utf8_string(buf)?)
            }
            SERVER_REFERENCE_IDENTIFIER => {
                set_once(&mut self.server_reference, read_utf8_string(buf)?)
            }
            REASON_STRING_IDENTIFIER => set_once(&mut self.reason_string, read_utf8_string(buf)?),
            RECEIVE_MAXIMUM_IDENTIFIER => set_once(&mut self.receive_maximum, read_u16(buf)?),
            TOPIC_ALIAS_MAXIMUM_IDENTIFIER => {
                set_once(&mut self.topic_alias_maximum, read_u16(buf)?)
            }
            TOPIC_ALIAS_IDENTIFIER => set_once(&mut self.topic_alias, read_u16(buf)?),
            MAXIMUM_QOS_IDENTIFIER => set_once(&mut self.maximum_qos, read_u8(buf)?),
            RETAIN_AVAILABLE_IDENTIFIER => set_once(&mut self.retain_available, read_u8(buf)?),
            USER_PROPERTY_IDENTIFIER => {
                let (name, value) = read_utf8_string_pair(buf)?;
                self.user_properties.push(UserProperty { name, value });
                Ok(())
            }
            MAXIMUM_PACKET_SIZE_IDENTIFIER => {
                set_once(&mut self.maximum_packet_size, read_u32(buf)?)
            }
            WILDCARD_SUBSCRIPTION_AVAILABLE_IDENTIFIER => {
                set_once(&mut self.wildcard_subscription_available, read_u8(buf)?)
            }
            SUBSCRIPTION_IDENTIFIERS_AVAILABLE_IDENTIFIER => {
                set_once(&mut self.subscription_identifiers_available, read_u8(buf)?)
            }
            SHARED_SUBSCRIPTION_AVAILABLE_IDENTIFIER => {
                set_once(&mut self.shared_subscription_available, read_u8(buf)?)
            }
            _ => Err(malformed("unknown property identifier")),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<(), DecodingError> {
    if slot.is_some() {
        return Err(malformed("property included more than once"));
    }

    *slot = Some(value);
    Ok(())
}

fn malformed(reason: &'static str) -> DecodingError {
    DecodingError::MalformedProperty(reason.into())
}

/// Writes `properties` when the protocol version carries them. Nothing for 3.1.1.
pub(crate) fn write_if_supported<E: Encoder>(
    properties: &Properties,
    version: crate::protocol::ProtocolVersion,
    out: &mut E,
) -> Result<(), E::Error> {
    if version.has_properties() {
        properties.write(out)?;
    }

    Ok(())
}

/// Parses a properties block when the protocol version carries one. Empty for 3.1.1.
pub(crate) fn parse_if_supported(
    buf: &mut Bytes,
    version: crate::protocol::ProtocolVersion,
) -> Result<Properties, DecodingError> {
    if version.has_properties() {
        return Properties::parse(buf);
    }

    Ok(Properties::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Properties {
        Properties {
            payload_format_indicator: Some(1),
            message_expiry_interval: Some(60),
            content_type: Some("application/json".into()),
            response_topic: Some("reply/here".into()),
            correlation_data: Some(Bytes::from_static(b"\x01\x02")),
            subscription_identifiers: vec![1, 268_435_455],
            session_expiry_interval: Some(u32::MAX),
            assigned_client_identifier: Some("auto-1".into()),
            server_keep_alive: Some(30),
            authentication_method: Some("SCRAM-SHA-1".into()),
            authentication_data: Some(Bytes::from_static(b"data")),
            request_problem_information: Some(0),
            will_delay_interval: Some(5),
            request_response_information: Some(1),
            response_information: Some("info".into()),
            server_reference: Some("other:1883".into()),
            reason_string: Some("because".into()),
            receive_maximum: Some(10),
            topic_alias_maximum: Some(20),
            topic_alias: Some(3),
            maximum_qos: Some(1),
            retain_available: Some(0),
            user_properties: vec![
                UserProperty::new("k", "v1"),
                UserProperty::new("k", "v2"),
                UserProperty::new("a", "b"),
            ],
            maximum_packet_size: Some(1024),
            wildcard_subscription_available: Some(0),
            subscription_identifiers_available: Some(1),
            shared_subscription_available: Some(0),
        }
    }

    #[test]
    fn empty_block_is_a_single_zero_byte() {
        let mut buf = BytesMut::new();
        Properties::default().serialize(&mut buf).unwrap();

        assert_eq!(&buf[..], &[0x00]);
        assert_eq!(Properties::default().size(), 1);
    }

    #[test]
    fn every_property_survives_serialization() {
        let properties = full();

        let mut buf = BytesMut::new();
        properties.serialize(&mut buf).unwrap();
        assert_eq!(properties.size(), buf.len());

        let mut bytes = buf.freeze();
        assert_eq!(Properties::parse(&mut bytes).unwrap(), properties);
        assert!(bytes.is_empty());
    }

    #[test]
    fn user_properties_keep_order_and_duplicates() {
        let properties = Properties::with_user_properties(vec![
            UserProperty::new("x", "1"),
            UserProperty::new("x", "1"),
        ]);

        let mut buf = BytesMut::new();
        properties.serialize(&mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[0x0E, 0x26, 0x00, 0x01, b'x', 0x00, 0x01, b'1', 0x26, 0x00, 0x01, b'x', 0x00, 0x01, b'1']
        );
    }

    #[test]
    fn serialization_is_in_identifier_order() {
        let properties = Properties {
            reason_string: Some("r".into()),
            subscription_identifiers: vec![7],
            ..Properties::default()
        };

        let mut buf = BytesMut::new();
        properties.serialize(&mut buf).unwrap();

        assert_eq!(&buf[..], &[0x06, 0x0B, 0x07, 0x1F, 0x00, 0x01, b'r']);
    }

    #[test]
    fn parse_stops_at_declared_length() {
        let mut buf = Bytes::from_static(&[0x02, 0x24, 0x01, 0xAA]);

        let properties = Properties::parse(&mut buf).unwrap();
        assert_eq!(properties.maximum_qos, Some(1));
        assert_eq!(&buf[..], &[0xAA]);
    }

    #[test]
    fn unknown_identifier_is_malformed() {
        let mut buf = Bytes::from_static(&[0x02, 0x7F, 0x00]);
        assert!(matches!(Properties::parse(&mut buf), Err(DecodingError::MalformedProperty(_))));
    }

    #[test]
    fn duplicated_single_valued_property_is_malformed() {
        let mut buf = Bytes::from_static(&[0x04, 0x24, 0x01, 0x24, 0x00]);
        assert!(matches!(Properties::parse(&mut buf), Err(DecodingError::MalformedProperty(_))));
    }

    #[test]
    fn truncated_value_is_malformed() {
        // Declares a u32 but the block only has two bytes left
        let mut buf = Bytes::from_static(&[0x03, 0x27, 0x00, 0x01]);
        assert!(matches!(Properties::parse(&mut buf), Err(DecodingError::MalformedProperty(_))));
    }

    #[test]
    fn length_past_the_packet_is_malformed() {
        let mut buf = Bytes::from_static(&[0x05, 0x24, 0x01]);
        assert!(matches!(Properties::parse(&mut buf), Err(DecodingError::MalformedProperty(_))));
    }

    #[test]
    fn too_long_string_fails_to_serialize() {
        let properties = Properties {
            reason_string: Some("r".repeat(70_000)),
            ..Properties::default()
        };

        let mut buf = BytesMut::new();
        assert_eq!(properties.serialize(&mut buf), Err(EncodingError::StringTooLong(70_000)));
    }
}
