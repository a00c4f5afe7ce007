use crate::{
    packets::Packet,
    protocol::{PacketType, ProtocolVersion},
};

use super::{AckStep, Operation};

/// PINGREQ, settled by the next PINGRESP.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl Operation for Ping {
    type Response = ();

    fn build(&self) -> Packet {
        Packet::PingReq
    }

    fn awaiting(&self) -> Option<PacketType> {
        Some(PacketType::PingResp)
    }

    fn on_packet(
        &mut self,
        _packet_id: Option<u16>,
        packet: &Packet,
        _version: ProtocolVersion,
    ) -> AckStep<()> {
        match packet {
            Packet::PingResp => AckStep::Done(Ok(())),
            _ => AckStep::NotMine,
        }
    }
}
