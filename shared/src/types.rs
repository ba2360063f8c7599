use uuid::Uuid;

/// Rolling 16-bit counter stamped by a sender on each edit packet.
/// Wraps modulo 2^16; compare through the wrapping_number helpers.
pub type SequenceNumber = u16;

/// Identity of a remote participant. Equality defines sender identity.
pub type NodeId = Uuid;
