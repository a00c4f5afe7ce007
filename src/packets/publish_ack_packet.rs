use bytes::Bytes;

use crate::{
    codec::{read_u16, Encoder},
    error::PacketError,
    properties::Properties,
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_tail, write_reason_tail, DecodablePacket, EncodablePacket};

/// Body shared by PUBACK, PUBREC, PUBREL and PUBCOMP.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901121>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishAckPacket {
    pub packet_id: u16,

    /// Always success under MQTT 3.1.1.
    pub reason_code: ReasonCode,

    pub properties: Properties,
}

impl PublishAckPacket {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id, ..Self::default() }
    }
}

impl EncodablePacket for PublishAckPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_two_byte_int(self.packet_id);

        if version.has_properties() {
            write_reason_tail(self.reason_code, &self.properties, out)?;
        }

        Ok(())
    }
}

impl DecodablePacket for PublishAckPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let packet_id = read_u16(buf)?;

        if !version.has_properties() {
            return Ok(Self::new(packet_id));
        }

        let (reason_code, properties) = read_reason_tail(buf)?;

        Ok(Self { packet_id, reason_code, properties })
    }
}
