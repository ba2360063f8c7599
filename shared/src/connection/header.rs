use super::{error::PacketError, packet_type::PacketType};

/// Version byte written into every standard header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Reads and writes the opaque header prefix at the front of every packet.
///
/// The processor and the NACK emitter only ever touch headers through this
/// trait, so a deployment with a different header layout slots its own codec
/// in without touching either.
pub trait PacketHeaderCodec {
    /// Number of bytes the header occupies at the front of `packet`.
    fn header_len(&self, packet: &[u8]) -> usize;

    /// The packet type encoded in the header. Truncated headers, unknown
    /// type bytes, and unsupported versions are errors.
    fn read_packet_type(&self, packet: &[u8]) -> Result<PacketType, PacketError>;

    /// Appends a header for `packet_type` to `buffer`, returning the number
    /// of bytes written.
    fn write_header(&self, buffer: &mut Vec<u8>, packet_type: PacketType) -> usize;
}

/// The stock two-byte header: `[type_byte, version_byte]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StandardHeaderCodec;

impl StandardHeaderCodec {
    const HEADER_BYTES: usize = 2;
}

impl PacketHeaderCodec for StandardHeaderCodec {
    fn header_len(&self, _packet: &[u8]) -> usize {
        Self::HEADER_BYTES
    }

    fn read_packet_type(&self, packet: &[u8]) -> Result<PacketType, PacketError> {
        let header = packet
            .get(..Self::HEADER_BYTES)
            .ok_or(PacketError::TooShort {
                len: packet.len(),
                offset: 0,
                needed: Self::HEADER_BYTES,
            })?;
        if header[1] != PROTOCOL_VERSION {
            return Err(PacketError::UnsupportedVersion {
                version: header[1],
                expected: PROTOCOL_VERSION,
            });
        }
        PacketType::from_u8(header[0])
    }

    fn write_header(&self, buffer: &mut Vec<u8>, packet_type: PacketType) -> usize {
        buffer.push(packet_type.to_u8());
        buffer.push(PROTOCOL_VERSION);
        Self::HEADER_BYTES
    }
}
