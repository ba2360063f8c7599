use thiserror::Error;

/// Error returned when a datagram could not be written to a remote node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to send {payload_size} byte datagram")]
pub struct SendError {
    /// Size of the datagram that could not be written
    pub payload_size: usize,
}
