use bytes::{Buf, Bytes};

use crate::{
    codec::{read_u16, read_utf8_string, Encoder},
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::ProtocolVersion,
};

use super::{DecodablePacket, EncodablePacket};

/// Removes one or more subscriptions.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901179>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,

    /// Only user properties are allowed here.
    pub properties: Properties,
}

impl UnsubscribePacket {
    pub fn new(topic_filters: Vec<String>) -> Self {
        Self { packet_id: 0, topic_filters, properties: Properties::default() }
    }
}

impl EncodablePacket for UnsubscribePacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_two_byte_int(self.packet_id);
        write_if_supported(&self.properties, version, out)?;

        for topic_filter in &self.topic_filters {
            out.put_utf8_string(topic_filter)?;
        }

        Ok(())
    }
}

impl DecodablePacket for UnsubscribePacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let packet_id = read_u16(buf)?;
        let properties = parse_if_supported(buf, version)?;

        if !buf.has_remaining() {
            return Err(ProtocolError::malformed("UNSUBSCRIBE has no topic filters").into());
        }

        let mut topic_filters = Vec::new();
        while buf.has_remaining() {
            topic_filters.push(read_utf8_string(buf)?);
        }

        Ok(Self { packet_id, topic_filters, properties })
    }
}
