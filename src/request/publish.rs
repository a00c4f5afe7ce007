use log::trace;

use crate::{
    broker::BrokerCapabilities,
    error::{RequestError, ValidationError},
    packets::{Packet, PublishAckPacket, PublishPacket},
    protocol::{validation::is_valid_topic_name, PacketType, ProtocolVersion, QoS},
};

use super::{is_ack, AckStep, Operation};

/// PUBLISH of an application message.
///
/// - `QoS` 0 settles once sent, with no acknowledgement.
/// - `QoS` 1 settles on the PUBACK.
/// - `QoS` 2 answers the PUBREC with a PUBREL and settles on the PUBCOMP.
///
/// An acknowledgement carrying a failure reason code settles it with `RequestError::Rejected`.
#[derive(Debug, Clone)]
pub struct Publish {
    pub packet: PublishPacket,
    stage: Option<PacketType>,
}

impl Publish {
    pub fn new(packet: PublishPacket) -> Self {
        let stage = match packet.qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(PacketType::PubAck),
            QoS::ExactlyOnce => Some(PacketType::PubRec),
        };

        Self { packet, stage }
    }
}

impl Operation for Publish {
    /// The final acknowledgement, `None` for `QoS` 0.
    type Response = Option<PublishAckPacket>;

    fn validate(
        &self,
        version: ProtocolVersion,
        capabilities: &BrokerCapabilities,
    ) -> Result<(), ValidationError> {
        let topic = &self.packet.topic;

        // An empty topic name is allowed when a topic alias stands in for it
        let aliased = version.has_properties()
            && topic.is_empty()
            && self.packet.properties.topic_alias.is_some();

        if !aliased && !is_valid_topic_name(topic) {
            return Err(ValidationError::InvalidTopicName(topic.clone()));
        }

        if self.packet.retain && !capabilities.retain_available {
            return Err(ValidationError::RetainNotSupported);
        }

        if self.packet.qos > capabilities.maximum_qos {
            return Err(ValidationError::QosNotSupported(capabilities.maximum_qos));
        }

        Ok(())
    }

    fn build(&self) -> Packet {
        Packet::Publish(self.packet.clone())
    }

    fn awaiting(&self) -> Option<PacketType> {
        self.stage
    }

    fn sent(&mut self) -> Option<Self::Response> {
        match self.stage {
            None => Some(None),
            Some(_) => None,
        }
    }

    fn on_packet(
        &mut self,
        packet_id: Option<u16>,
        packet: &Packet,
        _version: ProtocolVersion,
    ) -> AckStep<Self::Response> {
        let Some(stage) = self.stage else {
            return AckStep::NotMine;
        };

        if !is_ack(packet, stage, packet_id) {
            return AckStep::NotMine;
        }

        let (Packet::PubAck(ack) | Packet::PubRec(ack) | Packet::PubComp(ack)) = packet else {
            return AckStep::NotMine;
        };

        if ack.reason_code.is_failure() {
            return AckStep::Done(Err(RequestError::Rejected(ack.reason_code)));
        }

        match stage {
            PacketType::PubRec => {
                trace!("PUBREC received for packet id {}, releasing", ack.packet_id);
                self.stage = Some(PacketType::PubComp);

                AckStep::Reply(Packet::PubRel(PublishAckPacket::new(ack.packet_id)))
            }
            _ => AckStep::Done(Ok(Some(ack.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::ReasonCode;

    fn publish(qos: QoS) -> Publish {
        Publish::new(PublishPacket::new("a/b", Bytes::from_static(b"x"), qos))
    }

    #[test]
    fn qos2_walks_through_pubrec_and_pubcomp() {
        let mut publish = publish(QoS::ExactlyOnce);
        let version = ProtocolVersion::V5;

        let pub_rec = Packet::PubRec(PublishAckPacket::new(3));
        let AckStep::Reply(reply) = publish.on_packet(Some(3), &pub_rec, version) else {
            panic!("PUBREC should be answered");
        };
        assert_eq!(reply, Packet::PubRel(PublishAckPacket::new(3)));
        assert_eq!(publish.awaiting(), Some(PacketType::PubComp));

        // A second PUBREC is no longer awaited
        assert!(matches!(publish.on_packet(Some(3), &pub_rec, version), AckStep::NotMine));

        let pub_comp = Packet::PubComp(PublishAckPacket::new(3));
        assert!(matches!(publish.on_packet(Some(3), &pub_comp, version), AckStep::Done(Ok(Some(_)))));
    }

    #[test]
    fn failed_puback_is_rejected() {
        let mut publish = publish(QoS::AtLeastOnce);
        let pub_ack = Packet::PubAck(PublishAckPacket {
            packet_id: 1,
            reason_code: ReasonCode::NotAuthorized,
            ..PublishAckPacket::default()
        });

        assert!(matches!(
            publish.on_packet(Some(1), &pub_ack, ProtocolVersion::V5),
            AckStep::Done(Err(RequestError::Rejected(ReasonCode::NotAuthorized)))
        ));
    }

    #[test]
    fn qos0_settles_on_send() {
        let mut publish = publish(QoS::AtMostOnce);

        assert_eq!(publish.awaiting(), None);
        assert_eq!(publish.sent(), Some(None));
    }

    #[test]
    fn capabilities_gate_retain_and_qos() {
        let capabilities = BrokerCapabilities {
            retain_available: false,
            maximum_qos: QoS::AtLeastOnce,
            ..BrokerCapabilities::default()
        };

        let mut retained = publish(QoS::AtMostOnce);
        retained.packet.retain = true;
        assert_eq!(
            retained.validate(ProtocolVersion::V5, &capabilities),
            Err(ValidationError::RetainNotSupported)
        );

        assert_eq!(
            publish(QoS::ExactlyOnce).validate(ProtocolVersion::V5, &capabilities),
            Err(ValidationError::QosNotSupported(QoS::AtLeastOnce))
        );
    }

    #[test]
    fn wildcard_topic_name_is_invalid() {
        let publish = Publish::new(PublishPacket::new("a/+", Bytes::new(), QoS::AtMostOnce));

        assert_eq!(
            publish.validate(ProtocolVersion::V311, &BrokerCapabilities::default()),
            Err(ValidationError::InvalidTopicName("a/+".into()))
        );
    }
}
