use bytes::{Buf, Bytes};

use crate::{
    codec::{read_u16, read_utf8_string, Encoder},
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, QoS},
};

use super::{DecodablePacket, EncodablePacket};

const DUP_FLAG: u8 = 0b0000_1000;
const QOS_MASK: u8 = 0b0000_0110;
const RETAIN_FLAG: u8 = 0b0000_0001;

/// Transports an application message.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901100>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,

    /// Set when the packet is a redelivery.
    pub dup: bool,

    /// Only carried on the wire for `QoS` 1 and 2. Zero for `QoS` 0.
    pub packet_id: u16,

    pub properties: Properties,
}

impl PublishPacket {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self { topic: topic.into(), payload: payload.into(), qos, ..Self::default() }
    }

    pub fn packet_id(&self) -> Option<u16> {
        match self.qos {
            QoS::AtMostOnce => None,
            _ => Some(self.packet_id),
        }
    }

    /// DUP, `QoS` and RETAIN as the flag bits of the fixed header.
    pub(crate) fn flags(&self) -> u8 {
        let mut flags = self.qos.to_u8() << 1;

        if self.dup {
            flags |= DUP_FLAG;
        }

        if self.retain {
            flags |= RETAIN_FLAG;
        }

        flags
    }
}

impl EncodablePacket for PublishPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_utf8_string(&self.topic)?;

        if self.qos != QoS::AtMostOnce {
            out.put_two_byte_int(self.packet_id);
        }

        write_if_supported(&self.properties, version, out)?;

        // The payload runs to the end of the packet, no length prefix
        out.put_raw(&self.payload);

        Ok(())
    }
}

impl DecodablePacket for PublishPacket {
    fn decode(buf: &mut Bytes, flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let qos = QoS::from_u8((flags & QOS_MASK) >> 1)
            .ok_or_else(|| ProtocolError::malformed("PUBLISH QoS is 3"))?;

        let dup = flags & DUP_FLAG != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(ProtocolError::malformed("DUP set on a QoS 0 PUBLISH").into());
        }

        let topic = read_utf8_string(buf)?;

        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => read_u16(buf)?,
        };

        if qos != QoS::AtMostOnce && packet_id == 0 {
            return Err(ProtocolError::malformed("PUBLISH packet identifier is 0").into());
        }

        let properties = parse_if_supported(buf, version)?;
        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self { topic, payload, qos, retain: flags & RETAIN_FLAG != 0, dup, packet_id, properties })
    }
}
