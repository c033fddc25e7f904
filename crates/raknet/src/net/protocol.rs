use std::net::SocketAddr;

use crate::codec::{CodecError, U24_MAX};

pub const RAKNET_PROTOCOL_VERSION: u8 = 5;
pub const DEFAULT_PORT: u16 = 19132;
pub const DEFAULT_MTU: u16 = 1492;
pub const MIN_MTU: u16 = 400;
pub const MAX_MTU: u16 = 1500;

/// IPv4 header plus UDP header, subtracted from the MTU to get the datagram budget.
pub const UDP_HEADER_OVERHEAD: usize = 28;
/// Flags byte plus the u24 sequence number.
pub const DATAGRAM_HEADER_SIZE: usize = 4;
pub const MAX_SPLIT_COUNT: u32 = 1024;
pub const MAX_PENDING_SPLITS: usize = 32;

/// Largest number of sequence numbers a single ACK/NAK range may cover.
pub const MAX_ACK_RANGE: u32 = 8192;
/// Most records accepted in one ACK/NAK. A full-size datagram of ranges holds about 210.
pub const MAX_ACK_RECORDS: usize = 256;

#[inline]
pub fn u24_next(value: u32) -> u32 {
    value.wrapping_add(1) & U24_MAX
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("unknown packet type 0x{0:02x}")]
    UnknownPacketType(u8),
    #[error("unknown offline packet 0x{0:02x}")]
    UnknownOfflineId(u8),
    #[error("no session for {0}")]
    SessionNotFound(SocketAddr),
}

/// Ids of the logical packets carried inside connected datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    ConnectedPing = 0x00,
    ConnectedPong = 0x03,
    ConnectionRequest = 0x09,
    ConnectionRequestAccepted = 0x10,
    NewIncomingConnection = 0x13,
    Disconnect = 0x15,

    LoginRequest = 0x82,
    LoginResponse = 0x83,
    Ready = 0x84,
    Message = 0x85,
    SetTime = 0x86,
    StartGame = 0x87,
    AddMob = 0x88,
    AddPlayer = 0x89,
    RemovePlayer = 0x8A,
    AddEntity = 0x8C,
    RemoveEntity = 0x8D,
    AddItemEntity = 0x8E,
    TakeItemEntity = 0x8F,
    MoveEntity = 0x90,
    MoveEntityPosRot = 0x93,
    RotateHead = 0x94,
    MovePlayer = 0x95,
    PlaceBlock = 0x96,
    RemoveBlock = 0x97,
    UpdateBlock = 0x98,
    AddPainting = 0x99,
    Explode = 0x9A,
    LevelEvent = 0x9B,
    TileEvent = 0x9C,
    EntityEvent = 0x9D,
    RequestChunk = 0x9E,
    ChunkData = 0x9F,
    PlayerEquipment = 0xA0,
    PlayerArmorEquipment = 0xA1,
    Interact = 0xA2,
    UseItem = 0xA3,
    PlayerAction = 0xA4,
    HurtArmor = 0xA6,
    SetEntityData = 0xA7,
    SetEntityMotion = 0xA8,
    SetRiding = 0xA9,
    SetHealth = 0xAA,
    SetSpawnPosition = 0xAB,
    Animate = 0xAC,
    Respawn = 0xAD,
    SendInventory = 0xAE,
    DropItem = 0xAF,
    ContainerOpen = 0xB0,
    ContainerClose = 0xB1,
    ContainerSetSlot = 0xB2,
    ContainerSetData = 0xB3,
    ContainerSetContent = 0xB4,
    ContainerAck = 0xB5,
    Chat = 0xB6,
    SignUpdate = 0xB7,
    AdventureSettings = 0xB8,
}

impl PacketId {
    /// Packets consumed by the transport itself rather than handed to the game layer.
    pub fn is_transport_control(self) -> bool {
        matches!(
            self,
            PacketId::ConnectedPing
                | PacketId::ConnectedPong
                | PacketId::ConnectionRequest
                | PacketId::ConnectionRequestAccepted
                | PacketId::NewIncomingConnection
                | PacketId::Disconnect
        )
    }
}

impl From<PacketId> for u8 {
    fn from(id: PacketId) -> Self {
        id as u8
    }
}

impl TryFrom<u8> for PacketId {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PacketId::*;

        let id = match value {
            0x00 => ConnectedPing,
            0x03 => ConnectedPong,
            0x09 => ConnectionRequest,
            0x10 => ConnectionRequestAccepted,
            0x13 => NewIncomingConnection,
            0x15 => Disconnect,
            0x82 => LoginRequest,
            0x83 => LoginResponse,
            0x84 => Ready,
            0x85 => Message,
            0x86 => SetTime,
            0x87 => StartGame,
            0x88 => AddMob,
            0x89 => AddPlayer,
            0x8A => RemovePlayer,
            0x8C => AddEntity,
            0x8D => RemoveEntity,
            0x8E => AddItemEntity,
            0x8F => TakeItemEntity,
            0x90 => MoveEntity,
            0x93 => MoveEntityPosRot,
            0x94 => RotateHead,
            0x95 => MovePlayer,
            0x96 => PlaceBlock,
            0x97 => RemoveBlock,
            0x98 => UpdateBlock,
            0x99 => AddPainting,
            0x9A => Explode,
            0x9B => LevelEvent,
            0x9C => TileEvent,
            0x9D => EntityEvent,
            0x9E => RequestChunk,
            0x9F => ChunkData,
            0xA0 => PlayerEquipment,
            0xA1 => PlayerArmorEquipment,
            0xA2 => Interact,
            0xA3 => UseItem,
            0xA4 => PlayerAction,
            0xA6 => HurtArmor,
            0xA7 => SetEntityData,
            0xA8 => SetEntityMotion,
            0xA9 => SetRiding,
            0xAA => SetHealth,
            0xAB => SetSpawnPosition,
            0xAC => Animate,
            0xAD => Respawn,
            0xAE => SendInventory,
            0xAF => DropItem,
            0xB0 => ContainerOpen,
            0xB1 => ContainerClose,
            0xB2 => ContainerSetSlot,
            0xB3 => ContainerSetData,
            0xB4 => ContainerSetContent,
            0xB5 => ContainerAck,
            0xB6 => Chat,
            0xB7 => SignUpdate,
            0xB8 => AdventureSettings,
            other => return Err(PacketError::UnknownPacketType(other)),
        };

        Ok(id)
    }
}
