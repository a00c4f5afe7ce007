use bytes::{Buf, Bytes, BytesMut};

use crate::{
    codec::{read_u8, variable_byte_int_len, Encoder, SizeCounter},
    error::{DecodingError, EncodingError, PacketError, ProtocolError},
    frame::Frame,
    properties::Properties,
    protocol::{PacketType, ProtocolVersion, ReasonCode},
};

pub mod auth_packet;
pub mod conn_ack_packet;
pub mod connect_packet;
pub mod disconnect_packet;
pub mod publish_ack_packet;
pub mod publish_packet;
pub mod sub_ack_packet;
pub mod subscribe_packet;
pub mod unsub_ack_packet;
pub mod unsubscribe_packet;

pub use auth_packet::AuthPacket;
pub use conn_ack_packet::ConnAckPacket;
pub use connect_packet::{ConnectPacket, Will};
pub use disconnect_packet::DisconnectPacket;
pub use publish_ack_packet::PublishAckPacket;
pub use publish_packet::PublishPacket;
pub use sub_ack_packet::SubAckPacket;
pub use subscribe_packet::{RetainHandling, SubscribePacket, Subscription};
pub use unsub_ack_packet::UnsubAckPacket;
pub use unsubscribe_packet::UnsubscribePacket;

/// Writes the variable header and payload of a packet.
pub(crate) trait EncodablePacket {
    fn write<E: Encoder>(&self, version: ProtocolVersion, out: &mut E) -> Result<(), E::Error>;
}

/// Reads the variable header and payload of a packet.
///
/// `buf` holds exactly the payload of one frame. Implementations must consume all of it.
pub(crate) trait DecodablePacket: Sized {
    fn decode(buf: &mut Bytes, flags: u8, version: ProtocolVersion) -> Result<Self, PacketError>;
}

/// An MQTT control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PublishAckPacket),
    PubRec(PublishAckPacket),
    PubRel(PublishAckPacket),
    PubComp(PublishAckPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    pub fn kind(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect(_) => PacketType::Disconnect,
            Self::Auth(_) => PacketType::Auth,
        }
    }

    /// The 4 flag bits of the fixed header.
    pub fn flags(&self) -> u8 {
        match self {
            Self::Publish(publish) => publish.flags(),
            _ => self.kind().fixed_flags().unwrap_or(0),
        }
    }

    /// The packet identifier, for packets that carry one.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Publish(publish) => publish.packet_id(),
            Self::PubAck(ack) | Self::PubRec(ack) | Self::PubRel(ack) | Self::PubComp(ack) => {
                Some(ack.packet_id)
            }
            Self::Subscribe(subscribe) => Some(subscribe.packet_id),
            Self::SubAck(sub_ack) => Some(sub_ack.packet_id),
            Self::Unsubscribe(unsubscribe) => Some(unsubscribe.packet_id),
            Self::UnsubAck(unsub_ack) => Some(unsub_ack.packet_id),
            _ => None,
        }
    }

    /// Stamps the packet identifier. Packets without one are left untouched.
    pub fn set_packet_id(&mut self, packet_id: u16) {
        match self {
            Self::Publish(publish) => publish.packet_id = packet_id,
            Self::PubAck(ack) | Self::PubRec(ack) | Self::PubRel(ack) | Self::PubComp(ack) => {
                ack.packet_id = packet_id;
            }
            Self::Subscribe(subscribe) => subscribe.packet_id = packet_id,
            Self::SubAck(sub_ack) => sub_ack.packet_id = packet_id,
            Self::Unsubscribe(unsubscribe) => unsubscribe.packet_id = packet_id,
            Self::UnsubAck(unsub_ack) => unsub_ack.packet_id = packet_id,
            _ => {}
        }
    }

    /// Byte count of the payload, fixed header and remaining length excluded.
    pub fn size(&self, version: ProtocolVersion) -> usize {
        SizeCounter::measure(|out| self.write_payload(version, out))
    }

    /// Byte count of the whole frame as it goes on the wire.
    pub fn frame_size(&self, version: ProtocolVersion) -> usize {
        let size = self.size(version);
        let remaining_len = u32::try_from(size).map_or(4, variable_byte_int_len);

        1 + remaining_len + size
    }

    /// Serializes the packet into a frame.
    ///
    /// # Errors
    /// - Returns `EncodingError::UnsupportedPacket` for AUTH under MQTT 3.1.1.
    /// - Returns `EncodingError::StringTooLong` or `EncodingError::ValueTooLarge` for fields
    ///   the wire format cannot carry.
    pub fn serialize(&self, version: ProtocolVersion) -> Result<Frame, EncodingError> {
        if matches!(self, Self::Auth(_)) && !version.has_properties() {
            return Err(EncodingError::UnsupportedPacket { kind: self.kind(), version });
        }

        let mut payload = BytesMut::with_capacity(self.size(version));
        self.write_payload(version, &mut payload)?;

        Ok(Frame { kind: self.kind(), flags: self.flags(), payload: payload.freeze() })
    }

    fn write_payload<E: Encoder>(
        &self,
        version: ProtocolVersion,
        out: &mut E,
    ) -> Result<(), E::Error> {
        match self {
            Self::Connect(connect) => connect.write(version, out),
            Self::ConnAck(conn_ack) => conn_ack.write(version, out),
            Self::Publish(publish) => publish.write(version, out),
            Self::PubAck(ack) | Self::PubRec(ack) | Self::PubRel(ack) | Self::PubComp(ack) => {
                ack.write(version, out)
            }
            Self::Subscribe(subscribe) => subscribe.write(version, out),
            Self::SubAck(sub_ack) => sub_ack.write(version, out),
            Self::Unsubscribe(unsubscribe) => unsubscribe.write(version, out),
            Self::UnsubAck(unsub_ack) => unsub_ack.write(version, out),
            Self::PingReq | Self::PingResp => Ok(()),
            Self::Disconnect(disconnect) => disconnect.write(version, out),
            Self::Auth(auth) => auth.write(version, out),
        }
    }

    /// Parses the payload of a frame into a packet.
    ///
    /// # Errors
    /// - Returns `DecodingError::UnknownPacketKind` for a kind outside 1..=15.
    /// - Returns a `ProtocolError` with `MalformedPacket` for payloads that do not fit the kind.
    pub fn parse(
        kind: u8,
        flags: u8,
        mut payload: Bytes,
        version: ProtocolVersion,
    ) -> Result<Self, PacketError> {
        let kind = PacketType::from_u8(kind).ok_or(DecodingError::UnknownPacketKind(kind))?;

        // The frame is complete, so running out of bytes means the payload lied about its shape
        let packet = Self::decode_payload(kind, flags, &mut payload, version).map_err(|e| {
            if e.is_truncated() {
                return ProtocolError::malformed(format!("{kind} payload is truncated")).into();
            }
            e
        })?;

        if payload.has_remaining() {
            let message = format!("{kind} has {} unexpected trailing bytes", payload.remaining());
            return Err(ProtocolError::malformed(message).into());
        }

        Ok(packet)
    }

    fn decode_payload(
        kind: PacketType,
        flags: u8,
        buf: &mut Bytes,
        version: ProtocolVersion,
    ) -> Result<Self, PacketError> {
        let packet = match kind {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(buf, flags, version)?),
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode(buf, flags, version)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode(buf, flags, version)?),
            PacketType::PubAck => Self::PubAck(PublishAckPacket::decode(buf, flags, version)?),
            PacketType::PubRec => Self::PubRec(PublishAckPacket::decode(buf, flags, version)?),
            PacketType::PubRel => Self::PubRel(PublishAckPacket::decode(buf, flags, version)?),
            PacketType::PubComp => Self::PubComp(PublishAckPacket::decode(buf, flags, version)?),
            PacketType::Subscribe => {
                Self::Subscribe(SubscribePacket::decode(buf, flags, version)?)
            }
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode(buf, flags, version)?),
            PacketType::Unsubscribe => {
                Self::Unsubscribe(UnsubscribePacket::decode(buf, flags, version)?)
            }
            PacketType::UnsubAck => Self::UnsubAck(UnsubAckPacket::decode(buf, flags, version)?),
            PacketType::PingReq => Self::PingReq,
            PacketType::PingResp => Self::PingResp,
            PacketType::Disconnect => {
                Self::Disconnect(DisconnectPacket::decode(buf, flags, version)?)
            }
            PacketType::Auth => Self::Auth(AuthPacket::decode(buf, flags, version)?),
        };

        Ok(packet)
    }
}

pub(crate) fn read_reason_code(buf: &mut Bytes) -> Result<ReasonCode, PacketError> {
    let value = read_u8(buf)?;

    ReasonCode::from_u8(value).ok_or_else(|| {
        ProtocolError::malformed(format!("Unknown reason code: {value:#04x}")).into()
    })
}

/// Writes the reason code and properties tail shared by PUBACK, PUBREC, PUBREL, PUBCOMP,
/// DISCONNECT and AUTH under MQTT 5.
///
/// Both are omitted when the reason is success and there are no properties, and the
/// properties alone are omitted when empty.
pub(crate) fn write_reason_tail<E: Encoder>(
    reason_code: ReasonCode,
    properties: &Properties,
    out: &mut E,
) -> Result<(), E::Error> {
    if reason_code == ReasonCode::Success && properties.is_empty() {
        return Ok(());
    }

    out.put_byte(reason_code.to_u8());
    if !properties.is_empty() {
        properties.write(out)?;
    }

    Ok(())
}

/// Reads the tail written by `write_reason_tail`, accepting all three forms.
pub(crate) fn read_reason_tail(buf: &mut Bytes) -> Result<(ReasonCode, Properties), PacketError> {
    if !buf.has_remaining() {
        return Ok((ReasonCode::Success, Properties::default()));
    }

    let reason_code = read_reason_code(buf)?;
    if !buf.has_remaining() {
        return Ok((reason_code, Properties::default()));
    }

    Ok((reason_code, Properties::parse(buf)?))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{
        properties::UserProperty,
        protocol::QoS,
    };

    const VERSIONS: [ProtocolVersion; 2] = [ProtocolVersion::V311, ProtocolVersion::V5];

    fn user_properties() -> Properties {
        Properties::with_user_properties(vec![UserProperty::new("key", "value")])
    }

    /// A sample of every variant, shaped so that nothing is lost under the given version.
    fn samples(version: ProtocolVersion) -> Vec<Packet> {
        let v5 = version.has_properties();
        let properties = || if v5 { user_properties() } else { Properties::default() };

        let mut packets = vec![
            Packet::Connect(ConnectPacket {
                client_id: "client-1".into(),
                clean_start: true,
                keep_alive: 60,
                will: Some(Will {
                    topic: "will/topic".into(),
                    payload: Bytes::from_static(b"gone"),
                    qos: QoS::AtLeastOnce,
                    retain: true,
                    properties: properties(),
                }),
                username: Some("user".into()),
                password: Some(Bytes::from_static(b"secret")),
                properties: properties(),
            }),
            Packet::ConnAck(ConnAckPacket {
                session_present: true,
                reason_code: ReasonCode::Success,
                properties: properties(),
            }),
            Packet::ConnAck(ConnAckPacket {
                session_present: false,
                reason_code: ReasonCode::NotAuthorized,
                properties: Properties::default(),
            }),
            Packet::Publish(PublishPacket {
                topic: "a/b".into(),
                payload: Bytes::from_static(b"hello"),
                qos: QoS::ExactlyOnce,
                retain: true,
                dup: true,
                packet_id: 7,
                properties: properties(),
            }),
            Packet::Publish(PublishPacket::new("a/b", Bytes::new(), QoS::AtMostOnce)),
            Packet::PubAck(PublishAckPacket::new(1)),
            Packet::PubRec(PublishAckPacket::new(2)),
            Packet::PubRel(PublishAckPacket::new(3)),
            Packet::PubComp(PublishAckPacket::new(4)),
            Packet::Subscribe(SubscribePacket {
                packet_id: 5,
                subscriptions: vec![
                    Subscription::new("a/+", QoS::AtLeastOnce),
                    Subscription::new("b/#", QoS::ExactlyOnce),
                ],
                properties: properties(),
            }),
            Packet::SubAck(SubAckPacket {
                packet_id: 5,
                reason_codes: vec![ReasonCode::GrantedQoS1, ReasonCode::UnspecifiedError],
                properties: properties(),
            }),
            Packet::Unsubscribe(UnsubscribePacket {
                packet_id: 6,
                topic_filters: vec!["a/+".into(), "b/#".into()],
                properties: properties(),
            }),
            Packet::UnsubAck(UnsubAckPacket {
                packet_id: 6,
                reason_codes: if v5 {
                    vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted]
                } else {
                    Vec::new()
                },
                properties: properties(),
            }),
            Packet::PingReq,
            Packet::PingResp,
            Packet::Disconnect(DisconnectPacket::default()),
        ];

        if v5 {
            packets.extend([
                Packet::PubAck(PublishAckPacket {
                    packet_id: 9,
                    reason_code: ReasonCode::NoMatchingSubscribers,
                    properties: Properties::default(),
                }),
                Packet::PubRec(PublishAckPacket {
                    packet_id: 10,
                    reason_code: ReasonCode::QuotaExceeded,
                    properties: user_properties(),
                }),
                Packet::Subscribe(SubscribePacket {
                    packet_id: 11,
                    subscriptions: vec![Subscription {
                        topic_filter: "$share/group/c".into(),
                        qos: QoS::AtMostOnce,
                        no_local: true,
                        retain_as_published: true,
                        retain_handling: RetainHandling::DoNotSendAtSubscribe,
                    }],
                    properties: Properties {
                        subscription_identifiers: vec![42],
                        ..Properties::default()
                    },
                }),
                Packet::Disconnect(DisconnectPacket {
                    reason_code: ReasonCode::DisconnectWithWillMessage,
                    properties: Properties::default(),
                }),
                Packet::Auth(AuthPacket {
                    reason_code: ReasonCode::ContinueAuthentication,
                    properties: Properties {
                        authentication_method: Some("SCRAM-SHA-1".into()),
                        ..Properties::default()
                    },
                }),
                Packet::Auth(AuthPacket::default()),
            ]);
        }

        packets
    }

    #[test]
    fn every_variant_round_trips() {
        for version in VERSIONS {
            for packet in samples(version) {
                let frame = packet.serialize(version).unwrap();
                assert_eq!(frame.payload.len(), packet.size(version), "{packet:?} {version}");

                let parsed = Packet::parse(frame.kind.to_u8(), frame.flags, frame.payload, version)
                    .unwrap_or_else(|e| panic!("{packet:?} {version}: {e}"));
                assert_eq!(parsed, packet, "{version}");
            }
        }
    }

    #[test]
    fn frame_size_counts_header_and_length() {
        let packet = Packet::Subscribe(SubscribePacket::new(vec![Subscription::new(
            "a/b",
            QoS::AtLeastOnce,
        )]));

        assert_eq!(packet.size(ProtocolVersion::V5), 9);
        assert_eq!(packet.frame_size(ProtocolVersion::V5), 11);
        assert_eq!(packet.size(ProtocolVersion::V311), 8);
    }

    #[test]
    fn v311_drops_properties() {
        let mut subscribe = SubscribePacket::new(vec![Subscription::new("a", QoS::AtMostOnce)]);
        subscribe.properties = user_properties();
        let packet = Packet::Subscribe(subscribe);

        let frame = packet.serialize(ProtocolVersion::V311).unwrap();
        assert_eq!(&frame.payload[..], &[0x00, 0x00, 0x00, 0x01, b'a', 0x00]);
    }

    #[test]
    fn v5_unsubscribe_always_has_properties() {
        let packet = Packet::Unsubscribe(UnsubscribePacket::new(vec!["a".into()]));

        let frame = packet.serialize(ProtocolVersion::V5).unwrap();
        assert_eq!(&frame.payload[..], &[0x00, 0x00, 0x00, 0x00, 0x01, b'a']);
    }

    #[test]
    fn auth_is_not_encodable_under_v311() {
        let packet = Packet::Auth(AuthPacket::default());

        assert_eq!(
            packet.serialize(ProtocolVersion::V311),
            Err(EncodingError::UnsupportedPacket {
                kind: PacketType::Auth,
                version: ProtocolVersion::V311
            })
        );
    }

    #[test]
    fn successful_acks_are_compacted() {
        let packet = Packet::PubAck(PublishAckPacket::new(0x0102));

        let frame = packet.serialize(ProtocolVersion::V5).unwrap();
        assert_eq!(&frame.payload[..], &[0x01, 0x02]);

        let packet = Packet::PubAck(PublishAckPacket {
            packet_id: 1,
            reason_code: ReasonCode::NotAuthorized,
            properties: Properties::default(),
        });
        let frame = packet.serialize(ProtocolVersion::V5).unwrap();
        assert_eq!(&frame.payload[..], &[0x00, 0x01, 0x87]);
    }

    #[test]
    fn ack_with_empty_properties_block_parses() {
        let payload = Bytes::from_static(&[0x00, 0x01, 0x10, 0x00]);

        let packet = Packet::parse(4, 0, payload, ProtocolVersion::V5).unwrap();
        assert_eq!(
            packet,
            Packet::PubAck(PublishAckPacket {
                packet_id: 1,
                reason_code: ReasonCode::NoMatchingSubscribers,
                properties: Properties::default(),
            })
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Packet::parse(0, 0, Bytes::new(), ProtocolVersion::V5).unwrap_err();
        assert_eq!(err, PacketError::Decoding(DecodingError::UnknownPacketKind(0)));
    }

    #[test]
    fn unsubscribe_without_filters_is_malformed() {
        let payload = Bytes::from_static(&[0x00, 0x01, 0x00]);

        let err = Packet::parse(10, 0b0010, payload, ProtocolVersion::V5).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Protocol(ProtocolError { code: ReasonCode::MalformedPacket, .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let payload = Bytes::from_static(&[0x01]);

        let err = Packet::parse(12, 0, payload, ProtocolVersion::V311).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Protocol(ProtocolError { code: ReasonCode::MalformedPacket, .. })
        ));
    }

    #[test]
    fn truncated_payload_is_malformed_not_pending() {
        // SUBACK declaring a packet identifier but carrying a single byte
        let payload = Bytes::from_static(&[0x00]);

        let err = Packet::parse(9, 0, payload, ProtocolVersion::V311).unwrap_err();
        assert!(!err.is_truncated());
        assert!(matches!(err, PacketError::Protocol(_)));
    }
}
