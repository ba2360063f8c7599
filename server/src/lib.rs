//! # Canopy Server
//! The inbound half of an octree edit server: a dedicated worker drains
//! queued edit packets, applies their records to a shared octree, tracks
//! per-sender delivery reliability across 16-bit sequence rollover, and
//! periodically NACKs sequence numbers observed missing.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use canopy_shared::{
        gunzip, gzip, read_nack_packet, sequence_greater_than, wrapping_diff, write_nack_packets,
        EditPreamble, NodeId, OctreeSnapshot, PacketError, PacketHeaderCodec, PacketType,
        SequenceNumber, SnapshotError, SnapshotPayload, StandardHeaderCodec, Timestamp, Uuid,
        EDIT_PREAMBLE_BYTES, INITIAL_VERSION, MTU_SIZE_BYTES, PROTOCOL_VERSION,
    };
}

mod envelope;
mod error;
mod nack;
mod node_directory;
mod octree;
mod processor;
mod sender_registry;
mod sequence_tracker;

pub use envelope::PacketEnvelope;
pub use error::SendError;
pub use nack::NackEmitter;
pub use node_directory::NodeDirectory;
pub use octree::{Octree, SharedOctree};
pub use processor::{InboundPacketQueue, PacketProcessor, ProcessorConfig, ShutdownSignal};
pub use sender_registry::SenderRegistry;
pub use sequence_tracker::{
    SequenceTracker, MAX_MISSING_SEQUENCE_SIZE, MAX_REASONABLE_SEQUENCE_GAP,
};
