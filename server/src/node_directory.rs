use canopy_shared::NodeId;

use crate::error::SendError;

/// Lookup, liveness, and datagram transport for the set of nodes this
/// server talks to.
pub trait NodeDirectory {
    /// Opaque per-node destination, resolved once per NACK sweep.
    type Handle;

    /// Resolves a node id to a destination handle, if the node is known.
    fn lookup(&self, node_id: &NodeId) -> Option<Self::Handle>;

    /// Whether the node is still considered connected.
    fn is_alive(&self, node_id: &NodeId) -> bool;

    /// Records that a packet from `node_id` arrived at `heard_at_us`
    /// (microseconds since UNIX epoch).
    fn note_heard_from(&self, node_id: &NodeId, heard_at_us: u64);

    /// Writes a datagram to `dest` without waiting for verification,
    /// returning the bytes written.
    fn send_unverified_datagram(
        &self,
        payload: &[u8],
        dest: &Self::Handle,
    ) -> Result<usize, SendError>;
}
