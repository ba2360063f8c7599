// An enum representing the different types of packets that can be
// sent/received

use super::error::PacketError;

#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum PacketType {
    // Insert a new element into the octree
    EntityAdd,
    // Modify an existing octree element
    EntityEdit,
    // Remove an element from the octree
    EntityErase,
    // Receiver -> sender: sequence numbers observed missing
    EntityNack,
    // A serialized octree snapshot payload
    EntityData,
}

impl PacketType {
    /// The wire byte for this packet type.
    pub fn to_u8(self) -> u8 {
        match self {
            PacketType::EntityAdd => 0,
            PacketType::EntityEdit => 1,
            PacketType::EntityErase => 2,
            PacketType::EntityNack => 3,
            PacketType::EntityData => 4,
        }
    }

    /// Decodes a wire byte. Malformed or newer-protocol packets can carry
    /// any byte, so unknown values are an error, never a panic.
    pub fn from_u8(byte: u8) -> Result<Self, PacketError> {
        match byte {
            0 => Ok(PacketType::EntityAdd),
            1 => Ok(PacketType::EntityEdit),
            2 => Ok(PacketType::EntityErase),
            3 => Ok(PacketType::EntityNack),
            4 => Ok(PacketType::EntityData),
            byte => Err(PacketError::UnknownPacketType { byte }),
        }
    }
}
