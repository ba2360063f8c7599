use std::sync::{Arc, RwLock};

use canopy_shared::{NodeId, PacketType};

/// The spatial store this server mutates. Opaque here: the processor only
/// asks whether a packet type is an edit stream it understands, then feeds
/// it edit records one at a time.
pub trait Octree: Send + Sync {
    /// Whether `packet_type` is an edit stream this octree consumes.
    fn handles_edit_packet_type(&self, packet_type: PacketType) -> bool;

    /// Applies the single edit record found at `cursor` in `packet`,
    /// returning the bytes consumed. Returning 0 marks the rest of the
    /// packet malformed and stops the caller.
    fn process_edit_packet_data(
        &mut self,
        packet_type: PacketType,
        packet: &[u8],
        cursor: usize,
        sender: Option<&NodeId>,
    ) -> usize;
}

/// The octree as shared between the processor and the rest of the server.
/// The write lock is held per edit record, never across a whole packet, so
/// long packets yield frequently.
pub type SharedOctree<O> = Arc<RwLock<O>>;
