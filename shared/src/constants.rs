/// The largest datagram the transport carries without fragmenting.
/// Outbound NACK packets are sized to never exceed this.
pub const MTU_SIZE_BYTES: usize = 1450;
