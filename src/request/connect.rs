use crate::{
    broker::BrokerCapabilities,
    error::{RequestError, ValidationError},
    packets::{ConnAckPacket, ConnectPacket, Packet},
    protocol::{
        validation::{is_valid_topic_name, is_valid_utf8_string},
        PacketType, ProtocolVersion,
    },
};

use super::{AckStep, Operation};

/// CONNECT, settled by the CONNACK.
///
/// A CONNACK carrying a failure reason code settles it with `RequestError::ConnectionRefused`.
#[derive(Debug, Clone)]
pub struct Connect {
    pub packet: ConnectPacket,
}

impl Connect {
    pub fn new(packet: ConnectPacket) -> Self {
        Self { packet }
    }
}

impl Operation for Connect {
    type Response = ConnAckPacket;

    fn validate(
        &self,
        version: ProtocolVersion,
        _capabilities: &BrokerCapabilities,
    ) -> Result<(), ValidationError> {
        if !is_valid_utf8_string(&self.packet.client_id) {
            return Err(ValidationError::InvalidString("client identifier"));
        }

        // An empty client identifier only works if the session is not resumed
        if self.packet.client_id.is_empty()
            && !self.packet.clean_start
            && !version.has_properties()
        {
            return Err(ValidationError::InvalidString("client identifier"));
        }

        if let Some(will) = &self.packet.will {
            if !is_valid_topic_name(&will.topic) {
                return Err(ValidationError::InvalidTopicName(will.topic.clone()));
            }
        }

        match &self.packet.username {
            Some(username) if !is_valid_utf8_string(username) => {
                Err(ValidationError::InvalidString("user name"))
            }
            _ => Ok(()),
        }
    }

    fn build(&self) -> Packet {
        Packet::Connect(self.packet.clone())
    }

    fn awaiting(&self) -> Option<PacketType> {
        Some(PacketType::ConnAck)
    }

    fn on_packet(
        &mut self,
        _packet_id: Option<u16>,
        packet: &Packet,
        _version: ProtocolVersion,
    ) -> AckStep<ConnAckPacket> {
        let Packet::ConnAck(conn_ack) = packet else {
            return AckStep::NotMine;
        };

        if conn_ack.reason_code.is_failure() {
            return AckStep::Done(Err(RequestError::ConnectionRefused(conn_ack.reason_code)));
        }

        AckStep::Done(Ok(conn_ack.clone()))
    }

    fn requires_connection(&self) -> bool {
        false
    }
}
