use bytes::Bytes;
use glam::Vec3;

use mcpe_raknet::{CodecError, PacketId, Reader, Writer};

pub const PROTOCOL_VERSION: i32 = 14;

/// Closes the entity metadata block in `AddPlayer`.
const METADATA_END: u8 = 0x7f;

#[derive(Debug, thiserror::Error)]
pub enum GamePacketError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("expected packet {expected:?}, found 0x{found:02x}")]
    UnexpectedId { expected: PacketId, found: u8 },
}

/// A game payload carried as one logical packet, id byte first.
pub trait GamePacket: Sized {
    const ID: PacketId;

    fn encode_body(&self, w: &mut Writer);

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError>;

    fn encode(&self) -> Bytes {
        let mut w = Writer::with_capacity(64);
        w.put_u8(Self::ID.into());
        self.encode_body(&mut w);
        w.freeze()
    }

    fn decode(payload: &[u8]) -> Result<Self, GamePacketError> {
        let mut r = Reader::new(payload);
        let found = r.read_u8()?;
        if found != u8::from(Self::ID) {
            return Err(GamePacketError::UnexpectedId {
                expected: Self::ID,
                found,
            });
        }
        Ok(Self::decode_body(&mut r)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LoginStatus {
    VersionsMatch = 0,
    ClientOutdated = 1,
    ServerOutdated = 2,
}

impl LoginStatus {
    pub fn for_versions(protocol1: i32, protocol2: i32, server: i32) -> Self {
        if protocol1 == server && protocol2 == server {
            LoginStatus::VersionsMatch
        } else if protocol1 < server || protocol2 < server {
            LoginStatus::ClientOutdated
        } else {
            LoginStatus::ServerOutdated
        }
    }

    fn from_i32(value: i32) -> Self {
        match value {
            0 => LoginStatus::VersionsMatch,
            2 => LoginStatus::ServerOutdated,
            _ => LoginStatus::ClientOutdated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub protocol1: i32,
    pub protocol2: i32,
    pub client_id: i32,
}

impl GamePacket for LoginRequest {
    const ID: PacketId = PacketId::LoginRequest;

    fn encode_body(&self, w: &mut Writer) {
        w.put_string(&self.username);
        w.put_i32(self.protocol1);
        w.put_i32(self.protocol2);
        w.put_i32(self.client_id);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            username: r.read_string()?,
            protocol1: r.read_i32()?,
            protocol2: r.read_i32()?,
            client_id: r.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub status: LoginStatus,
}

impl GamePacket for LoginResponse {
    const ID: PacketId = PacketId::LoginResponse;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i32(self.status as i32);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            status: LoginStatus::from_i32(r.read_i32()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ready {
    pub status: u8,
}

impl GamePacket for Ready {
    const ID: PacketId = PacketId::Ready;

    fn encode_body(&self, w: &mut Writer) {
        w.put_u8(self.status);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            status: r.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source: String,
    pub message: String,
}

impl GamePacket for Message {
    const ID: PacketId = PacketId::Message;

    fn encode_body(&self, w: &mut Writer) {
        w.put_string(&self.source);
        w.put_string(&self.message);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: r.read_string()?,
            message: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetTime {
    pub time: i32,
    pub started: u8,
}

impl GamePacket for SetTime {
    const ID: PacketId = PacketId::SetTime;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i32(self.time);
        w.put_u8(self.started);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            time: r.read_i32()?,
            started: r.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartGame {
    pub seed: i32,
    pub generator: i32,
    pub gamemode: i32,
    pub entity_id: i32,
    pub position: Vec3,
}

impl GamePacket for StartGame {
    const ID: PacketId = PacketId::StartGame;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i32(self.seed);
        w.put_i32(self.generator);
        w.put_i32(self.gamemode);
        w.put_i32(self.entity_id);
        w.put_vec3(self.position);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            seed: r.read_i32()?,
            generator: r.read_i32()?,
            gamemode: r.read_i32()?,
            entity_id: r.read_i32()?,
            position: r.read_vec3()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddPlayer {
    pub client_id: i64,
    pub username: String,
    pub entity_id: i32,
    pub position: Vec3,
    pub pitch: i8,
    pub yaw: i8,
}

impl GamePacket for AddPlayer {
    const ID: PacketId = PacketId::AddPlayer;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i64(self.client_id);
        w.put_string(&self.username);
        w.put_i32(self.entity_id);
        w.put_vec3(self.position);
        w.put_i8(self.pitch);
        w.put_i8(self.yaw);
        w.put_u8(METADATA_END);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let packet = Self {
            client_id: r.read_i64()?,
            username: r.read_string()?,
            entity_id: r.read_i32()?,
            position: r.read_vec3()?,
            pitch: r.read_i8()?,
            yaw: r.read_i8()?,
        };
        // Metadata entries are not interpreted; skip to the terminator.
        while r.read_u8()? != METADATA_END {}
        Ok(packet)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovePlayer {
    pub entity_id: i32,
    pub client_id: i64,
}

impl GamePacket for RemovePlayer {
    const ID: PacketId = PacketId::RemovePlayer;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i32(self.entity_id);
        w.put_i64(self.client_id);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            entity_id: r.read_i32()?,
            client_id: r.read_i64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovePlayer {
    pub entity_id: i32,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl GamePacket for MovePlayer {
    const ID: PacketId = PacketId::MovePlayer;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i32(self.entity_id);
        w.put_vec3(self.position);
        w.put_f32(self.yaw);
        w.put_f32(self.pitch);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            entity_id: r.read_i32()?,
            position: r.read_vec3()?,
            yaw: r.read_f32()?,
            pitch: r.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animate {
    pub action: u8,
    pub entity_id: i32,
}

impl GamePacket for Animate {
    const ID: PacketId = PacketId::Animate;

    fn encode_body(&self, w: &mut Writer) {
        w.put_u8(self.action);
        w.put_i32(self.entity_id);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            action: r.read_u8()?,
            entity_id: r.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetHealth {
    pub health: i8,
}

impl SetHealth {
    /// Alpha clients send some health values shifted down by 64; fold them back.
    pub fn normalized(&self) -> Self {
        let health = if self.health < -31 {
            self.health + 64
        } else {
            self.health
        };
        Self { health }
    }
}

impl GamePacket for SetHealth {
    const ID: PacketId = PacketId::SetHealth;

    fn encode_body(&self, w: &mut Writer) {
        w.put_i8(self.health);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            health: r.read_i8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStack {
    pub id: i16,
    pub count: u8,
    pub meta: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSetContent {
    pub window_id: u8,
    pub items: Vec<ItemStack>,
    /// Only sent for the player inventory (window 0).
    pub hotbar: Vec<i32>,
}

impl GamePacket for ContainerSetContent {
    const ID: PacketId = PacketId::ContainerSetContent;

    fn encode_body(&self, w: &mut Writer) {
        w.put_u8(self.window_id);
        w.put_u16(self.items.len() as u16);
        for item in &self.items {
            w.put_i16(item.id);
            w.put_u8(item.count);
            w.put_i16(item.meta);
        }
        if self.window_id == 0 {
            w.put_u16(self.hotbar.len() as u16);
            for slot in &self.hotbar {
                w.put_i32(*slot);
            }
        }
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let window_id = r.read_u8()?;

        let count = r.read_u16()?;
        let mut items = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            items.push(ItemStack {
                id: r.read_i16()?,
                count: r.read_u8()?,
                meta: r.read_i16()?,
            });
        }

        let mut hotbar = Vec::new();
        if window_id == 0 {
            let count = r.read_u16()?;
            for _ in 0..count {
                hotbar.push(r.read_i32()?);
            }
        }

        Ok(Self {
            window_id,
            items,
            hotbar,
        })
    }
}

/// Packs a view angle in degrees into the single byte the client expects.
pub fn angle_to_byte(degrees: f32) -> i8 {
    (degrees / 360.0 * 256.0) as i32 as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_layout() {
        let login = LoginRequest {
            username: "bob".into(),
            protocol1: 14,
            protocol2: 14,
            client_id: 7,
        };
        let bytes = login.encode();

        assert_eq!(bytes[0], 0x82);
        assert_eq!(&bytes[1..6], &[0u8, 3, b'b', b'o', b'b']);
        assert_eq!(bytes.len(), 1 + 5 + 12);
        assert_eq!(LoginRequest::decode(&bytes).unwrap(), login);
    }

    #[test]
    fn test_login_status() {
        assert_eq!(
            LoginStatus::for_versions(14, 14, PROTOCOL_VERSION),
            LoginStatus::VersionsMatch
        );
        assert_eq!(
            LoginStatus::for_versions(13, 13, PROTOCOL_VERSION),
            LoginStatus::ClientOutdated
        );
        assert_eq!(
            LoginStatus::for_versions(15, 15, PROTOCOL_VERSION),
            LoginStatus::ServerOutdated
        );
        assert_eq!(
            LoginResponse {
                status: LoginStatus::ServerOutdated
            }
            .encode()
            .as_ref(),
            &[0x83u8, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_add_player_terminator() {
        let add = AddPlayer {
            client_id: 9,
            username: "alice".into(),
            entity_id: 3,
            position: Vec3::new(1.0, 2.0, 3.0),
            pitch: -12,
            yaw: 64,
        };
        let bytes = add.encode();

        assert_eq!(*bytes.last().unwrap(), METADATA_END);
        assert_eq!(AddPlayer::decode(&bytes).unwrap(), add);
    }

    #[test]
    fn test_wrong_id_rejected() {
        let bytes = Message {
            source: String::new(),
            message: "hi".into(),
        }
        .encode();

        assert!(matches!(
            Animate::decode(&bytes),
            Err(GamePacketError::UnexpectedId { found: 0x85, .. })
        ));
        assert!(matches!(
            Message::decode(&bytes[..4]),
            Err(GamePacketError::Codec(CodecError::TruncatedInput { .. }))
        ));
    }

    #[test]
    fn test_set_health_normalized() {
        assert_eq!(SetHealth { health: -40 }.normalized().health, 24);
        assert_eq!(SetHealth { health: -31 }.normalized().health, -31);
        assert_eq!(SetHealth { health: 20 }.normalized().health, 20);
        assert_eq!(SetHealth { health: 20 }.encode().as_ref(), &[0xAAu8, 20]);
    }

    #[test]
    fn test_inventory_layout() {
        let content = ContainerSetContent {
            window_id: 0,
            items: vec![ItemStack {
                id: 5,
                count: 10,
                meta: 0,
            }],
            hotbar: vec![0],
        };
        let bytes = content.encode();

        assert_eq!(
            bytes.as_ref(),
            &[0xB4u8, 0, 0, 1, 0, 5, 10, 0, 0, 0, 1, 0, 0, 0, 0]
        );
        assert_eq!(ContainerSetContent::decode(&bytes).unwrap(), content);

        let chest = ContainerSetContent {
            window_id: 2,
            items: Vec::new(),
            hotbar: Vec::new(),
        };
        assert_eq!(chest.encode().len(), 4);
    }

    #[test]
    fn test_angle_packing() {
        assert_eq!(angle_to_byte(0.0), 0);
        assert_eq!(angle_to_byte(90.0), 64);
        assert_eq!(angle_to_byte(180.0), -128);
        assert_eq!(angle_to_byte(-90.0), -64);
    }
}
