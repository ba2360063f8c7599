use canopy_shared::NodeId;

/// An inbound datagram plus the identity of the node that sent it. Owned by
/// the processor from dequeue until its edit records are applied, then
/// dropped.
#[derive(Debug, Clone)]
pub struct PacketEnvelope {
    /// Verified sender, or `None` for packets with no known source.
    pub sender: Option<NodeId>,
    /// The raw datagram: header, preamble, then edit records.
    pub payload: Vec<u8>,
}

impl PacketEnvelope {
    pub fn new(sender: Option<NodeId>, payload: Vec<u8>) -> Self {
        Self { sender, payload }
    }
}
