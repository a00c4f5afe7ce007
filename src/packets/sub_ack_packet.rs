use bytes::{Buf, Bytes};

use crate::{
    codec::{read_u16, read_u8, Encoder},
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_code, DecodablePacket, EncodablePacket};

/// The only failure return code MQTT 3.1.1 knows for a subscription.
const V311_FAILURE: u8 = 0x80;

/// Confirms a SUBSCRIBE with one result per requested subscription, in order.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901171>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubAckPacket {
    pub packet_id: u16,

    /// Granted `QoS` or failure, per subscription.
    pub reason_codes: Vec<ReasonCode>,

    pub properties: Properties,
}

impl EncodablePacket for SubAckPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_two_byte_int(self.packet_id);
        write_if_supported(&self.properties, version, out)?;

        for reason_code in &self.reason_codes {
            if version.has_properties() || !reason_code.is_failure() {
                out.put_byte(reason_code.to_u8());
            } else {
                out.put_byte(V311_FAILURE);
            }
        }

        Ok(())
    }
}

impl DecodablePacket for SubAckPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let packet_id = read_u16(buf)?;
        let properties = parse_if_supported(buf, version)?;

        let mut reason_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            let reason_code = match version {
                ProtocolVersion::V5 => read_reason_code(buf)?,
                ProtocolVersion::V311 => match read_u8(buf)? {
                    0x00 => ReasonCode::Success,
                    0x01 => ReasonCode::GrantedQoS1,
                    0x02 => ReasonCode::GrantedQoS2,
                    V311_FAILURE => ReasonCode::UnspecifiedError,
                    value => {
                        let message = format!("Unknown SUBACK return code: {value:#04x}");
                        return Err(ProtocolError::malformed(message).into());
                    }
                },
            };

            reason_codes.push(reason_code);
        }

        Ok(Self { packet_id, reason_codes, properties })
    }
}
