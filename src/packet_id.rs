use std::collections::HashSet;

use crate::error::AllocatorExhausted;

/// Hands out the 16-bit packet identifiers correlating requests with their acknowledgements.
///
/// An identifier stays in use from `allocate` until `release`; no two outstanding
/// requests share one. Zero is never handed out.
pub trait PacketIdAllocator {
    /// # Errors
    /// - Returns `AllocatorExhausted` when all 65535 identifiers are in use.
    fn allocate(&mut self) -> Result<u16, AllocatorExhausted>;

    /// Returns an identifier. Releasing one that is not in use is a no-op.
    fn release(&mut self, packet_id: u16);

    /// Forgets every allocation.
    fn reset(&mut self);
}

/// Sequential allocator skipping identifiers still in use.
#[derive(Debug)]
pub struct PacketIds {
    next_id: u16,
    in_use: HashSet<u16>,
}

impl Default for PacketIds {
    fn default() -> Self {
        Self { next_id: 1, in_use: HashSet::new() }
    }
}

impl PacketIds {
    pub fn is_in_use(&self, packet_id: u16) -> bool {
        self.in_use.contains(&packet_id)
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    fn advance(&mut self) {
        self.next_id = match self.next_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
    }
}

impl PacketIdAllocator for PacketIds {
    fn allocate(&mut self) -> Result<u16, AllocatorExhausted> {
        if self.in_use.len() == usize::from(u16::MAX) {
            return Err(AllocatorExhausted);
        }

        while self.in_use.contains(&self.next_id) {
            self.advance();
        }

        let packet_id = self.next_id;
        self.in_use.insert(packet_id);
        self.advance();

        Ok(packet_id)
    }

    fn release(&mut self, packet_id: u16) {
        self.in_use.remove(&packet_id);
    }

    fn reset(&mut self) {
        self.in_use.clear();
        self.next_id = 1;
    }
}
