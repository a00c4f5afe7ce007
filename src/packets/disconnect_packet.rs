use bytes::Bytes;

use crate::{
    codec::Encoder,
    error::PacketError,
    properties::Properties,
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_tail, write_reason_tail, DecodablePacket, EncodablePacket};

/// The final packet sent before closing the network connection.
///
/// Empty under MQTT 3.1.1. Under MQTT 5 the reason code `Success` reads as
/// Normal disconnection.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901205>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl EncodablePacket for DisconnectPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        if version.has_properties() {
            write_reason_tail(self.reason_code, &self.properties, out)?;
        }

        Ok(())
    }
}

impl DecodablePacket for DisconnectPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        if !version.has_properties() {
            return Ok(Self::default());
        }

        let (reason_code, properties) = read_reason_tail(buf)?;

        Ok(Self { reason_code, properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_disconnect_with_reason_string() {
        let mut buf = Bytes::from_static(&[0x8B, 0x05, 0x1F, 0x00, 0x02, b'b', b'y']);

        let disconnect = DisconnectPacket::decode(&mut buf, 0, ProtocolVersion::V5).unwrap();
        assert_eq!(disconnect.reason_code, ReasonCode::ServerShuttingDown);
        assert_eq!(disconnect.properties.reason_string.as_deref(), Some("by"));
    }
}
