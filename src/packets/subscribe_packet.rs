use bytes::{Buf, Bytes};
use log::trace;

use crate::{
    codec::{read_u16, read_u8, read_utf8_string, Encoder},
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, QoS},
};

use super::{DecodablePacket, EncodablePacket};

const QOS_MASK: u8 = 0b0000_0011;
const NO_LOCAL_FLAG: u8 = 0b0000_0100;
const RETAIN_AS_PUBLISHED_FLAG: u8 = 0b0000_1000;
const RETAIN_HANDLING_MASK: u8 = 0b0011_0000;
const V5_RESERVED_MASK: u8 = 0b1100_0000;
const V311_RESERVED_MASK: u8 = 0b1111_1100;

/// Whether retained messages are sent when the subscription is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetainHandling {
    #[default]
    SendAtSubscribe = 0,
    SendAtSubscribeIfNew = 1,
    DoNotSendAtSubscribe = 2,
}

impl RetainHandling {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SendAtSubscribe),
            1 => Some(Self::SendAtSubscribeIfNew),
            2 => Some(Self::DoNotSendAtSubscribe),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A topic filter and its subscription options.
///
/// Only the `QoS` reaches the wire under MQTT 3.1.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_filter: String,
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl Subscription {
    pub fn new(topic_filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::default(),
        }
    }

    fn options(&self, version: ProtocolVersion) -> u8 {
        let mut options = self.qos.to_u8();

        if version.has_properties() {
            if self.no_local {
                options |= NO_LOCAL_FLAG;
            }
            if self.retain_as_published {
                options |= RETAIN_AS_PUBLISHED_FLAG;
            }
            options |= self.retain_handling.to_u8() << 4;
        }

        options
    }

    fn from_options(
        topic_filter: String,
        options: u8,
        version: ProtocolVersion,
    ) -> Result<Self, ProtocolError> {
        let reserved = match version {
            ProtocolVersion::V311 => V311_RESERVED_MASK,
            ProtocolVersion::V5 => V5_RESERVED_MASK,
        };

        if options & reserved != 0 {
            return Err(ProtocolError::malformed("Reserved subscription options are set"));
        }

        let qos = QoS::from_u8(options & QOS_MASK)
            .ok_or_else(|| ProtocolError::malformed("Subscription QoS is 3"))?;

        let retain_handling = RetainHandling::from_u8((options & RETAIN_HANDLING_MASK) >> 4)
            .ok_or_else(|| ProtocolError::malformed("Retain handling is 3"))?;

        Ok(Self {
            topic_filter,
            qos,
            no_local: options & NO_LOCAL_FLAG != 0,
            retain_as_published: options & RETAIN_AS_PUBLISHED_FLAG != 0,
            retain_handling,
        })
    }
}

/// Creates one or more subscriptions.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901161>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
    pub properties: Properties,
}

impl SubscribePacket {
    /// A SUBSCRIBE without packet identifier. It is stamped when the request is started.
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { packet_id: 0, subscriptions, properties: Properties::default() }
    }
}

impl EncodablePacket for SubscribePacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_two_byte_int(self.packet_id);
        write_if_supported(&self.properties, version, out)?;

        for subscription in &self.subscriptions {
            out.put_utf8_string(&subscription.topic_filter)?;
            out.put_byte(subscription.options(version));
        }

        Ok(())
    }
}

impl DecodablePacket for SubscribePacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let packet_id = read_u16(buf)?;
        trace!("packet_id: {packet_id}");

        let properties = parse_if_supported(buf, version)?;

        if !buf.has_remaining() {
            return Err(ProtocolError::malformed("SUBSCRIBE has no topic filters").into());
        }

        let mut subscriptions = Vec::new();
        while buf.has_remaining() {
            let topic_filter = read_utf8_string(buf)?;
            let options = read_u8(buf)?;

            subscriptions.push(Subscription::from_options(topic_filter, options, version)?);
        }

        Ok(Self { packet_id, subscriptions, properties })
    }
}
