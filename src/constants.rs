use std::time::Duration;

/// Protocol name.
pub(crate) const PROTOCOL_NAME: &str = "MQTT";

/// Largest value a variable byte integer can carry, and therefore the largest remaining length.
pub const MAX_VARIABLE_BYTE_INT: u32 = 268_435_455;

/// Maximum allowed length for a UTF-8 encoded string or binary data field.
pub const MAX_STRING_LENGTH: usize = 65_535;

/// Time a request waits for its acknowledgement unless the caller overrides it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial capacity of the connection read buffer.
pub(crate) const READ_BUFFER_CAPACITY: usize = 4096;

/// Capacity of the command and inbound packet channels of a connection.
pub(crate) const CHANNEL_CAPACITY: usize = 32;

// Property identifiers.
//
// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901029>
pub(crate) const PAYLOAD_FORMAT_INDICATOR_IDENTIFIER: u8 = 0x01;
pub(crate) const MESSAGE_EXPIRY_INTERVAL_IDENTIFIER: u8 = 0x02;
pub(crate) const CONTENT_TYPE_IDENTIFIER: u8 = 0x03;
pub(crate) const RESPONSE_TOPIC_IDENTIFIER: u8 = 0x08;
pub(crate) const CORRELATION_DATA_IDENTIFIER: u8 = 0x09;
pub(crate) const SUBSCRIPTION_IDENTIFIER_IDENTIFIER: u8 = 0x0B;
pub(crate) const SESSION_EXPIRY_INTERVAL_IDENTIFIER: u8 = 0x11;
pub(crate) const ASSIGNED_CLIENT_IDENTIFIER: u8 = 0x12;
pub(crate) const SERVER_KEEP_ALIVE_IDENTIFIER: u8 = 0x13;
pub(crate) const AUTHENTICATION_METHOD_IDENTIFIER: u8 = 0x15;
pub(crate) const AUTHENTICATION_DATA_IDENTIFIER: u8 = 0x16;
pub(crate) const REQUEST_PROBLEM_INFORMATION_IDENTIFIER: u8 = 0x17;
pub(crate) const WILL_DELAY_INTERVAL_IDENTIFIER: u8 = 0x18;
pub(crate) const REQUEST_RESPONSE_INFORMATION_IDENTIFIER: u8 = 0x19;
pub(crate) const RESPONSE_INFORMATION_IDENTIFIER: u8 = 0x1A;
pub(crate) const SERVER_REFERENCE_IDENTIFIER: u8 = 0x1C;
pub(crate) const REASON_STRING_IDENTIFIER: u8 = 0x1F;
pub(crate) const RECEIVE_MAXIMUM_IDENTIFIER: u8 = 0x21;
pub(crate) const TOPIC_ALIAS_MAXIMUM_IDENTIFIER: u8 = 0x22;
pub(crate) const TOPIC_ALIAS_IDENTIFIER: u8 = 0x23;
pub(crate) const MAXIMUM_QOS_IDENTIFIER: u8 = 0x24;
pub(crate) const RETAIN_AVAILABLE_IDENTIFIER: u8 = 0x25;
pub(crate) const USER_PROPERTY_IDENTIFIER: u8 = 0x26;
pub(crate) const MAXIMUM_PACKET_SIZE_IDENTIFIER: u8 = 0x27;
pub(crate) const WILDCARD_SUBSCRIPTION_AVAILABLE_IDENTIFIER: u8 = 0x28;
pub(crate) const SUBSCRIPTION_IDENTIFIERS_AVAILABLE_IDENTIFIER: u8 = 0x29;
pub(crate) const SHARED_SUBSCRIPTION_AVAILABLE_IDENTIFIER: u8 = 0x2A;
