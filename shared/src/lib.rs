//! # Canopy Shared
//! Wire formats, wrapping sequence arithmetic, and the octree snapshot codec
//! shared between canopy-server & the clients that stream edits to it.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use uuid::Uuid;

mod connection;
mod constants;
mod gzip;
mod snapshot;
mod timestamp;
mod types;
mod wrapping_number;

pub use connection::{
    edit_packet::{read_nack_packet, write_nack_packets, EditPreamble, EDIT_PREAMBLE_BYTES},
    error::PacketError,
    header::{PacketHeaderCodec, StandardHeaderCodec, PROTOCOL_VERSION},
    packet_type::PacketType,
};
pub use constants::MTU_SIZE_BYTES;
pub use gzip::{gunzip, gzip};
pub use snapshot::{OctreeSnapshot, SnapshotError, SnapshotPayload, INITIAL_VERSION};
pub use timestamp::{TimeError, Timestamp};
pub use types::{NodeId, SequenceNumber};
pub use wrapping_number::{sequence_greater_than, wrapping_diff};
