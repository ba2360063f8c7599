//! Byte layouts for edit and NACK packets.
//!
//! An edit packet is `header | u16 sequence | u64 send timestamp | records…`;
//! a NACK packet is `header | u16 count | count x u16 sequence`. All
//! multi-byte fields are little-endian on the wire, read and written through
//! `from_le_bytes`/`to_le_bytes` rather than in-place casts.

use std::mem::size_of;

use crate::types::SequenceNumber;

use super::{error::PacketError, header::PacketHeaderCodec, packet_type::PacketType};

/// Bytes occupied by the edit-packet preamble: `u16` sequence plus `u64`
/// send timestamp.
pub const EDIT_PREAMBLE_BYTES: usize = size_of::<u16>() + size_of::<u64>();

/// The fixed fields every edit packet carries between its header and its
/// edit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditPreamble {
    /// Rolling 16-bit sequence number stamped by the sender.
    pub sequence: SequenceNumber,
    /// Sender wall clock at transmission, microseconds since UNIX epoch.
    pub sent_at_us: u64,
}

impl EditPreamble {
    /// Reads the preamble beginning at `offset`, one past the header.
    pub fn read(packet: &[u8], offset: usize) -> Result<Self, PacketError> {
        let bytes = packet
            .get(offset..offset + EDIT_PREAMBLE_BYTES)
            .ok_or(PacketError::TooShort {
                len: packet.len(),
                offset,
                needed: EDIT_PREAMBLE_BYTES,
            })?;

        let sequence = u16::from_le_bytes([bytes[0], bytes[1]]);
        let mut timestamp = [0u8; size_of::<u64>()];
        timestamp.copy_from_slice(&bytes[size_of::<u16>()..]);

        Ok(Self {
            sequence,
            sent_at_us: u64::from_le_bytes(timestamp),
        })
    }

    /// Appends the preamble to an outgoing packet buffer.
    pub fn write_into(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.sequence.to_le_bytes());
        buffer.extend_from_slice(&self.sent_at_us.to_le_bytes());
    }
}

/// Packs `sequences` into as many NACK datagrams as needed.
///
/// Each datagram carries `min(remaining, (max_packet_size - header - 2) / 2)`
/// sequence numbers and never exceeds `max_packet_size`; the last may be
/// smaller. Sequence numbers are emitted in ascending numeric order so the
/// output is deterministic.
pub fn write_nack_packets<H: PacketHeaderCodec>(
    codec: &H,
    packet_type: PacketType,
    sequences: &[SequenceNumber],
    max_packet_size: usize,
) -> Vec<Vec<u8>> {
    let mut ordered: Vec<SequenceNumber> = sequences.to_vec();
    ordered.sort_unstable();

    let mut packets = Vec::new();
    let mut remaining: &[SequenceNumber] = &ordered;
    while !remaining.is_empty() {
        let mut packet = Vec::with_capacity(max_packet_size);
        let header_len = codec.write_header(&mut packet, packet_type);

        let room_for = max_packet_size
            .saturating_sub(header_len + size_of::<u16>())
            / size_of::<SequenceNumber>();
        if room_for == 0 {
            // header + count alone overflow the budget; nothing can be sent
            break;
        }

        let count = remaining.len().min(room_for).min(usize::from(u16::MAX));
        packet.extend_from_slice(&(count as u16).to_le_bytes());
        for sequence in &remaining[..count] {
            packet.extend_from_slice(&sequence.to_le_bytes());
        }

        packets.push(packet);
        remaining = &remaining[count..];
    }
    packets
}

/// Parses a NACK datagram produced by [`write_nack_packets`].
pub fn read_nack_packet<H: PacketHeaderCodec>(
    codec: &H,
    packet: &[u8],
) -> Result<Vec<SequenceNumber>, PacketError> {
    let offset = codec.header_len(packet);
    let count_bytes = packet
        .get(offset..offset + size_of::<u16>())
        .ok_or(PacketError::TooShort {
            len: packet.len(),
            offset,
            needed: size_of::<u16>(),
        })?;
    let declared = usize::from(u16::from_le_bytes([count_bytes[0], count_bytes[1]]));

    let body = &packet[offset + size_of::<u16>()..];
    let available = body.len() / size_of::<SequenceNumber>();
    if available < declared {
        return Err(PacketError::NackCountMismatch {
            declared,
            available,
        });
    }

    Ok(body
        .chunks_exact(size_of::<SequenceNumber>())
        .take(declared)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
