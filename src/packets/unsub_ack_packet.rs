use bytes::{Buf, Bytes};

use crate::{
    codec::{read_u16, Encoder},
    error::PacketError,
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_code, DecodablePacket, EncodablePacket};

/// Confirms an UNSUBSCRIBE.
///
/// MQTT 3.1.1 carries only the packet identifier; MQTT 5 adds one reason code per topic filter.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901187>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<ReasonCode>,
    pub properties: Properties,
}

impl EncodablePacket for UnsubAckPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_two_byte_int(self.packet_id);

        write_if_supported(&self.properties, version, out)?;

        if version.has_properties() {
            for reason_code in &self.reason_codes {
                out.put_byte(reason_code.to_u8());
            }
        }

        Ok(())
    }
}

impl DecodablePacket for UnsubAckPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let packet_id = read_u16(buf)?;
        let properties = parse_if_supported(buf, version)?;

        let mut reason_codes = Vec::new();
        if version.has_properties() {
            while buf.has_remaining() {
                reason_codes.push(read_reason_code(buf)?);
            }
        }

        Ok(Self { packet_id, reason_codes, properties })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn unsub_ack() -> UnsubAckPacket {
        UnsubAckPacket {
            packet_id: 3,
            reason_codes: vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
            properties: Properties::default(),
        }
    }

    #[test]
    fn mqtt311_carries_only_the_packet_id() {
        let mut buf = BytesMut::new();
        unsub_ack().write(ProtocolVersion::V311, &mut buf).unwrap();

        assert_eq!(&buf[..], &[0x00, 0x03]);
    }

    #[test]
    fn mqtt5_carries_properties_and_reason_codes() {
        let mut buf = BytesMut::new();
        unsub_ack().write(ProtocolVersion::V5, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x03, 0x00, 0x00, 0x11]);

        let mut bytes = buf.freeze();
        let decoded = UnsubAckPacket::decode(&mut bytes, 0, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, unsub_ack());
    }
}
