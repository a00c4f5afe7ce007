use crate::{
    packets::{DisconnectPacket, Packet},
    protocol::{PacketType, ProtocolVersion},
};

use super::{AckStep, Operation};

/// DISCONNECT. Nothing acknowledges it, so it settles once sent.
#[derive(Debug, Clone, Default)]
pub struct Disconnect {
    pub packet: DisconnectPacket,
}

impl Operation for Disconnect {
    type Response = ();

    fn build(&self) -> Packet {
        Packet::Disconnect(self.packet.clone())
    }

    fn awaiting(&self) -> Option<PacketType> {
        None
    }

    fn sent(&mut self) -> Option<()> {
        Some(())
    }

    fn on_packet(
        &mut self,
        _packet_id: Option<u16>,
        _packet: &Packet,
        _version: ProtocolVersion,
    ) -> AckStep<()> {
        AckStep::NotMine
    }
}
