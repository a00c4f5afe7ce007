use bytes::Bytes;
use log::trace;

use crate::{
    codec::{read_binary_data, read_u16, read_u8, read_utf8_string, Encoder},
    constants::PROTOCOL_NAME,
    error::{PacketError, ProtocolError},
    properties::{parse_if_supported, write_if_supported, Properties},
    protocol::{ProtocolVersion, QoS, ReasonCode},
};

use super::{DecodablePacket, EncodablePacket};

const USERNAME_FLAG: u8 = 0b1000_0000;
const PASSWORD_FLAG: u8 = 0b0100_0000;
const WILL_RETAIN_FLAG: u8 = 0b0010_0000;
const WILL_QOS_MASK: u8 = 0b0001_1000;
const WILL_FLAG: u8 = 0b0000_0100;
const CLEAN_START_FLAG: u8 = 0b0000_0010;
const RESERVED_FLAG: u8 = 0b0000_0001;

/// The application message the server publishes on the client's behalf when the
/// connection ends without a DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,

    /// Will properties. MQTT 5 only.
    pub properties: Properties,
}

/// The first packet a client sends after the network connection is established.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901033>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectPacket {
    /// Identifies the client to the server. May be empty for MQTT 5, in which case
    /// the server assigns one.
    pub client_id: String,

    /// Start a new session instead of resuming an existing one.
    ///
    /// Called Clean Session in MQTT 3.1.1.
    pub clean_start: bool,

    /// Maximum interval in seconds between two control packets sent by the client.
    pub keep_alive: u16,

    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,

    /// CONNECT properties. MQTT 5 only.
    pub properties: Properties,
}

impl ConnectPacket {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), clean_start: true, ..Self::default() }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;

        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }

        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }

        if let Some(will) = &self.will {
            flags |= WILL_FLAG | will.qos.to_u8() << 3;
            if will.retain {
                flags |= WILL_RETAIN_FLAG;
            }
        }

        if self.clean_start {
            flags |= CLEAN_START_FLAG;
        }

        flags
    }
}

impl EncodablePacket for ConnectPacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error> {
        // Variable header
        out.put_utf8_string(PROTOCOL_NAME)?;
        out.put_byte(version.to_u8());
        out.put_byte(self.connect_flags());
        out.put_two_byte_int(self.keep_alive);
        write_if_supported(&self.properties, version, out)?;

        // Payload
        out.put_utf8_string(&self.client_id)?;

        if let Some(will) = &self.will {
            write_if_supported(&will.properties, version, out)?;
            out.put_utf8_string(&will.topic)?;
            out.put_binary_data(&will.payload)?;
        }

        if let Some(username) = &self.username {
            out.put_utf8_string(username)?;
        }

        if let Some(password) = &self.password {
            out.put_binary_data(password)?;
        }

        Ok(())
    }
}

impl DecodablePacket for ConnectPacket {
    fn decode(buf: &mut Bytes, _flags: u8, version: ProtocolVersion) -> Result<Self, PacketError> {
        let protocol_name = read_utf8_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            let message = format!("Invalid protocol name: {protocol_name}");
            return Err(ProtocolError::malformed(message).into());
        }

        let level = read_u8(buf)?;
        if ProtocolVersion::from_u8(level) != Some(version) {
            let message = format!("Protocol level {level} does not match {version}");
            return Err(ProtocolError::new(ReasonCode::UnsupportedProtocolVersion, message).into());
        }

        let flags = read_u8(buf)?;
        trace!("connect flags: {flags:#010b}");

        if flags & RESERVED_FLAG != 0 {
            return Err(ProtocolError::malformed("Reserved connect flag is set").into());
        }

        let will_qos = QoS::from_u8((flags & WILL_QOS_MASK) >> 3)
            .ok_or_else(|| ProtocolError::malformed("Will QoS is 3"))?;

        let has_will = flags & WILL_FLAG != 0;
        if !has_will && (will_qos != QoS::AtMostOnce || flags & WILL_RETAIN_FLAG != 0) {
            return Err(ProtocolError::malformed("Will QoS or retain set without a will").into());
        }

        let keep_alive = read_u16(buf)?;
        let properties = parse_if_supported(buf, version)?;

        let client_id = read_utf8_string(buf)?;

        let will = if has_will {
            let properties = parse_if_supported(buf, version)?;
            let topic = read_utf8_string(buf)?;
            let payload = read_binary_data(buf)?;

            Some(Will {
                topic,
                payload,
                qos: will_qos,
                retain: flags & WILL_RETAIN_FLAG != 0,
                properties,
            })
        } else {
            None
        };

        let username = match flags & USERNAME_FLAG {
            0 => None,
            _ => Some(read_utf8_string(buf)?),
        };

        let password = match flags & PASSWORD_FLAG {
            0 => None,
            _ => Some(read_binary_data(buf)?),
        };

        Ok(Self {
            client_id,
            clean_start: flags & CLEAN_START_FLAG != 0,
            keep_alive,
            will,
            username,
            password,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn minimal_v311_connect() {
        let mut connect = ConnectPacket::new("c");
        connect.keep_alive = 10;

        let mut buf = BytesMut::new();
        connect.write(ProtocolVersion::V311, &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x0A, 0x00, 0x01, b'c']
        );
    }

    #[test]
    fn flags_reflect_will_and_credentials() {
        let connect = ConnectPacket {
            will: Some(Will {
                topic: "t".into(),
                payload: Bytes::new(),
                qos: QoS::ExactlyOnce,
                retain: true,
                properties: Properties::default(),
            }),
            username: Some("u".into()),
            password: Some(Bytes::from_static(b"p")),
            ..ConnectPacket::new("c")
        };

        assert_eq!(connect.connect_flags(), 0b1111_0110);
    }

    #[test]
    fn protocol_level_must_match() {
        let mut buf = BytesMut::new();
        ConnectPacket::new("c").write(ProtocolVersion::V311, &mut buf).unwrap();

        let err = ConnectPacket::decode(&mut buf.freeze(), 0, ProtocolVersion::V5).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Protocol(ProtocolError {
                code: ReasonCode::UnsupportedProtocolVersion,
                ..
            })
        ));
    }

    #[test]
    fn reserved_flag_is_malformed() {
        let mut buf = Bytes::from_static(&[
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x03, 0x00, 0x0A, 0x00, 0x00,
        ]);

        let err = ConnectPacket::decode(&mut buf, 0, ProtocolVersion::V311).unwrap_err();
        assert!(matches!(err, PacketError::Protocol(_)));
    }
}
