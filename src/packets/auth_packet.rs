use bytes::Bytes;

use crate::{
    codec::Encoder,
    error::{PacketError, ProtocolError},
    properties::Properties,
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_tail, write_reason_tail, DecodablePacket, EncodablePacket};

/// Extended authentication exchange. MQTT 5 only.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901217>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl EncodablePacket for AuthPacket {
    fn write<E: Encoder>(&self, _version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        write_reason_tail(self.reason_code, &self.properties, out)
    }
}

impl DecodablePacket for AuthPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        if !version.has_properties() {
            return Err(ProtocolError::malformed("AUTH is not part of MQTT 3.1.1").into());
        }

        let (reason_code, properties) = read_reason_tail(buf)?;

        Ok(Self { reason_code, properties })
    }
}
