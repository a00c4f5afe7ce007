use bytes::Bytes;

use crate::{
    codec::{read_u8, Encoder},
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, ReasonCode},
};

use super::{read_reason_code, DecodablePacket, EncodablePacket};

const SESSION_PRESENT_FLAG: u8 = 0b0000_0001;

/// The CONNACK packet is the packet sent by the Server in response to a CONNECT packet received from a Client.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901074>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnAckPacket {
    /// Whether the Server is using Session State from a previous connection for this `ClientID`.
    pub session_present: bool,

    /// Outcome of the connection attempt.
    ///
    /// MQTT 3.1.1 return codes are mapped onto the equivalent reason codes.
    pub reason_code: ReasonCode,

    /// Capabilities and assignments announced by the Server. MQTT 5 only.
    pub properties: Properties,
}

impl EncodablePacket for ConnAckPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        out.put_byte(if self.session_present { SESSION_PRESENT_FLAG } else { 0 });

        if version.has_properties() {
            out.put_byte(self.reason_code.to_u8());
        } else {
            out.put_byte(self.reason_code.to_v311_connect_return_code());
        }

        write_if_supported(&self.properties, version, out)
    }
}

impl DecodablePacket for ConnAckPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let acknowledge_flags = read_u8(buf)?;
        if acknowledge_flags & !SESSION_PRESENT_FLAG != 0 {
            return Err(ProtocolError::malformed("Reserved acknowledge flags are set").into());
        }

        let reason_code = if version.has_properties() {
            read_reason_code(buf)?
        } else {
            let value = read_u8(buf)?;
            ReasonCode::from_v311_connect_return_code(value).ok_or_else(|| {
                ProtocolError::malformed(format!("Unknown connect return code: {value}"))
            })?
        };

        let properties = parse_if_supported(buf, version)?;

        Ok(Self {
            session_present: acknowledge_flags & SESSION_PRESENT_FLAG != 0,
            reason_code,
            properties,
        })
    }
}
