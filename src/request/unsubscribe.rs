use crate::{
    broker::BrokerCapabilities,
    error::{ProtocolError, RequestError, ValidationError},
    packets::{Packet, UnsubAckPacket, UnsubscribePacket},
    properties::{Properties, UserProperty},
    protocol::{validation::is_valid_topic_filter, PacketType, ProtocolVersion, ReasonCode},
};

use super::{is_ack, AckStep, Operation};

/// UNSUBSCRIBE, settled by the matching UNSUBACK.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub topic_filters: Vec<String>,
    pub user_properties: Vec<UserProperty>,
}

impl Unsubscribe {
    pub fn new(topic_filters: Vec<String>) -> Self {
        Self { topic_filters, user_properties: Vec::new() }
    }
}

impl Operation for Unsubscribe {
    type Response = UnsubAckPacket;

    fn validate(
        &self,
        _version: ProtocolVersion,
        _capabilities: &BrokerCapabilities,
    ) -> Result<(), ValidationError> {
        if self.topic_filters.is_empty() {
            return Err(ValidationError::NoTopicFilters);
        }

        match self.topic_filters.iter().find(|filter| !is_valid_topic_filter(filter)) {
            Some(filter) => Err(ValidationError::InvalidTopicFilter(filter.clone())),
            None => Ok(()),
        }
    }

    fn build(&self) -> Packet {
        Packet::Unsubscribe(UnsubscribePacket {
            packet_id: 0,
            topic_filters: self.topic_filters.clone(),
            properties: Properties::with_user_properties(self.user_properties.clone()),
        })
    }

    fn awaiting(&self) -> Option<PacketType> {
        Some(PacketType::UnsubAck)
    }

    fn on_packet(
        &mut self,
        packet_id: Option<u16>,
        packet: &Packet,
        version: ProtocolVersion,
    ) -> AckStep<UnsubAckPacket> {
        let Packet::UnsubAck(unsub_ack) = packet else {
            return AckStep::NotMine;
        };

        if !is_ack(packet, PacketType::UnsubAck, packet_id) {
            return AckStep::NotMine;
        }

        // MQTT 3.1.1 acknowledges without per-filter results
        if version.has_properties() && unsub_ack.reason_codes.len() != self.topic_filters.len() {
            let message = format!(
                "UNSUBACK carries {} results for {} topic filters",
                unsub_ack.reason_codes.len(),
                self.topic_filters.len()
            );
            let error = ProtocolError::new(ReasonCode::ProtocolError, message);
            return AckStep::Done(Err(RequestError::Protocol(error)));
        }

        AckStep::Done(Ok(unsub_ack.clone()))
    }
}
