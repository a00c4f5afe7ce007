use crate::{
    broker::BrokerCapabilities,
    constants::MAX_VARIABLE_BYTE_INT,
    error::{ProtocolError, RequestError, ValidationError},
    packets::{Packet, SubAckPacket, SubscribePacket, Subscription},
    properties::{Properties, UserProperty},
    protocol::{
        validation::{has_wildcards, is_shared_subscription, is_valid_topic_filter},
        PacketType, ProtocolVersion, ReasonCode,
    },
};

use super::{is_ack, AckStep, Operation};

/// SUBSCRIBE, settled by the SUBACK carrying one result per subscription.
#[derive(Debug, Clone)]
pub struct Subscribe {
    pub subscriptions: Vec<Subscription>,

    /// Identifier echoed in every PUBLISH matching these subscriptions. MQTT 5 only.
    pub subscription_identifier: Option<u32>,

    pub user_properties: Vec<UserProperty>,
}

impl Subscribe {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions, subscription_identifier: None, user_properties: Vec::new() }
    }
}

impl Operation for Subscribe {
    type Response = SubAckPacket;

    fn validate(
        &self,
        version: ProtocolVersion,
        capabilities: &BrokerCapabilities,
    ) -> Result<(), ValidationError> {
        if self.subscriptions.is_empty() {
            return Err(ValidationError::NoTopicFilters);
        }

        for subscription in &self.subscriptions {
            if !is_valid_topic_filter(&subscription.topic_filter) {
                return Err(ValidationError::InvalidTopicFilter(subscription.topic_filter.clone()));
            }
        }

        if let Some(identifier) = self.subscription_identifier {
            if !(1..=MAX_VARIABLE_BYTE_INT).contains(&identifier) {
                return Err(ValidationError::InvalidSubscriptionIdentifier(identifier));
            }

            if version.has_properties() && !capabilities.subscription_identifiers_available {
                return Err(ValidationError::SubscriptionIdentifiersNotSupported);
            }
        }

        let filters = || self.subscriptions.iter().map(|s| s.topic_filter.as_str());

        if !capabilities.wildcard_subscription_available && filters().any(has_wildcards) {
            return Err(ValidationError::WildcardSubscriptionsNotSupported);
        }

        if !capabilities.shared_subscription_available && filters().any(is_shared_subscription) {
            return Err(ValidationError::SharedSubscriptionsNotSupported);
        }

        Ok(())
    }

    fn build(&self) -> Packet {
        let properties = Properties {
            subscription_identifiers: self.subscription_identifier.into_iter().collect(),
            user_properties: self.user_properties.clone(),
            ..Properties::default()
        };

        Packet::Subscribe(SubscribePacket {
            packet_id: 0,
            subscriptions: self.subscriptions.clone(),
            properties,
        })
    }

    fn awaiting(&self) -> Option<PacketType> {
        Some(PacketType::SubAck)
    }

    fn on_packet(
        &mut self,
        packet_id: Option<u16>,
        packet: &Packet,
        _version: ProtocolVersion,
    ) -> AckStep<SubAckPacket> {
        let Packet::SubAck(sub_ack) = packet else {
            return AckStep::NotMine;
        };

        if !is_ack(packet, PacketType::SubAck, packet_id) {
            return AckStep::NotMine;
        }

        if sub_ack.reason_codes.len() != self.subscriptions.len() {
            let message = format!(
                "SUBACK carries {} results for {} subscriptions",
                sub_ack.reason_codes.len(),
                self.subscriptions.len()
            );
            let error = ProtocolError::new(ReasonCode::ProtocolError, message);
            return AckStep::Done(Err(RequestError::Protocol(error)));
        }

        AckStep::Done(Ok(sub_ack.clone()))
    }
}
