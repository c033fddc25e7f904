use std::net::SocketAddr;

use bytes::Bytes;
use log::{debug, info, warn};

use mcpe_raknet::{CloseReason, ConnectionHandler, PacketId, Session, SessionTable};

use crate::packets::{
    AddPlayer, Animate, ContainerSetContent, GamePacket, GamePacketError, ItemStack,
    LoginRequest, LoginResponse, LoginStatus, Message, MovePlayer, PROTOCOL_VERSION, Ready,
    RemovePlayer, SetHealth, SetTime, StartGame, angle_to_byte,
};
use crate::world::{Player, World};

const RESERVED_NAMES: [&str; 3] = ["server", "rcon", "console"];

/// Ten planks in the first slot.
const STARTING_ITEMS: [ItemStack; 1] = [ItemStack {
    id: 5,
    count: 10,
    meta: 0,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    All,
    AllExcept(SocketAddr),
}

/// Game layer: logins, chat, health and movement relay on top of the transport.
pub struct GameServer {
    world: World,
    outbox: Vec<(Recipients, Bytes)>,
}

impl GameServer {
    pub fn new(world: World) -> Self {
        Self {
            world,
            outbox: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn queue(&mut self, recipients: Recipients, payload: Bytes) {
        self.outbox.push((recipients, payload));
    }

    fn handle_packet(
        &mut self,
        session: &mut Session,
        id: PacketId,
        payload: &[u8],
    ) -> Result<(), GamePacketError> {
        match id {
            PacketId::LoginRequest => self.handle_login(session, LoginRequest::decode(payload)?),
            PacketId::Ready => self.handle_ready(session, Ready::decode(payload)?),
            PacketId::Message => {
                let message = Message::decode(payload)?;
                info!("<{}> {}", message.source, message.message);
                self.queue(Recipients::All, message.encode());
            }
            PacketId::MovePlayer => self.handle_move(session, MovePlayer::decode(payload)?),
            PacketId::Animate => {
                let animate = Animate::decode(payload)?;
                self.queue(Recipients::All, animate.encode());
            }
            PacketId::SetHealth => {
                let health = SetHealth::decode(payload)?.normalized();
                self.queue(Recipients::All, health.encode());
            }

            PacketId::ConnectedPing
            | PacketId::ConnectedPong
            | PacketId::ConnectionRequest
            | PacketId::ConnectionRequestAccepted
            | PacketId::NewIncomingConnection
            | PacketId::Disconnect => {
                warn!("Transport packet {:?} reached the game layer", id);
            }

            PacketId::LoginResponse
            | PacketId::SetTime
            | PacketId::StartGame
            | PacketId::AddMob
            | PacketId::AddPlayer
            | PacketId::RemovePlayer
            | PacketId::AddEntity
            | PacketId::RemoveEntity
            | PacketId::AddItemEntity
            | PacketId::TakeItemEntity
            | PacketId::MoveEntity
            | PacketId::MoveEntityPosRot
            | PacketId::RotateHead
            | PacketId::PlaceBlock
            | PacketId::RemoveBlock
            | PacketId::UpdateBlock
            | PacketId::AddPainting
            | PacketId::Explode
            | PacketId::LevelEvent
            | PacketId::TileEvent
            | PacketId::EntityEvent
            | PacketId::RequestChunk
            | PacketId::ChunkData
            | PacketId::PlayerEquipment
            | PacketId::PlayerArmorEquipment
            | PacketId::Interact
            | PacketId::UseItem
            | PacketId::PlayerAction
            | PacketId::HurtArmor
            | PacketId::SetEntityData
            | PacketId::SetEntityMotion
            | PacketId::SetRiding
            | PacketId::SetSpawnPosition
            | PacketId::Respawn
            | PacketId::SendInventory
            | PacketId::DropItem
            | PacketId::ContainerOpen
            | PacketId::ContainerClose
            | PacketId::ContainerSetSlot
            | PacketId::ContainerSetData
            | PacketId::ContainerSetContent
            | PacketId::ContainerAck
            | PacketId::Chat
            | PacketId::SignUpdate
            | PacketId::AdventureSettings => {
                debug!("No handler for {:?} from {}", id, session.addr());
            }
        }

        Ok(())
    }

    fn handle_login(&mut self, session: &mut Session, login: LoginRequest) {
        let mut status = LoginStatus::for_versions(login.protocol1, login.protocol2, PROTOCOL_VERSION);

        let reserved = RESERVED_NAMES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&login.username));
        if reserved || self.world.by_name(&login.username).is_some() {
            status = LoginStatus::ClientOutdated;
        }

        session.send(LoginResponse { status }.encode());

        if status != LoginStatus::VersionsMatch {
            info!(
                "Rejected login for {} from {}: {:?}",
                login.username,
                session.addr(),
                status
            );
            return;
        }

        let seed = self.world.seed();
        let player = self
            .world
            .add_player(session.addr(), session.client_id(), &login.username);
        info!(
            "{} logged in from {} as entity {}",
            player.username, player.addr, player.entity_id
        );

        let start = StartGame {
            seed,
            generator: 0,
            gamemode: 0,
            entity_id: player.entity_id,
            position: player.position,
        };
        session.send(start.encode());
    }

    fn handle_ready(&mut self, session: &mut Session, ready: Ready) {
        debug!("{} ready (status {})", session.addr(), ready.status);

        let addr = session.addr();
        for player in self.world.players().filter(|p| p.addr != addr) {
            session.send(add_player_packet(player).encode());
        }

        let inventory = ContainerSetContent {
            window_id: 0,
            items: STARTING_ITEMS.to_vec(),
            hotbar: vec![0],
        };
        session.send(inventory.encode());

        session.send(
            SetTime {
                time: self.world.time(),
                started: 1,
            }
            .encode(),
        );

        if let Some(add) = self.world.get(&session.addr()).map(add_player_packet) {
            self.queue(Recipients::AllExcept(session.addr()), add.encode());
        }
    }

    fn handle_move(&mut self, session: &mut Session, movement: MovePlayer) {
        let addr = session.addr();
        let Some(player) = self
            .world
            .move_player(&addr, movement.position, movement.yaw, movement.pitch)
        else {
            debug!("Move from {} before login", addr);
            return;
        };

        let relay = MovePlayer {
            entity_id: player.entity_id,
            ..movement
        };
        self.queue(Recipients::AllExcept(addr), relay.encode());
    }
}

fn add_player_packet(player: &Player) -> AddPlayer {
    AddPlayer {
        client_id: player.client_id,
        username: player.username.clone(),
        entity_id: player.entity_id,
        position: player.position,
        pitch: angle_to_byte(player.pitch),
        yaw: angle_to_byte(player.yaw),
    }
}

impl ConnectionHandler for GameServer {
    fn on_open(&mut self, session: &mut Session) {
        debug!("[+] {} (client id {})", session.addr(), session.client_id());
    }

    fn on_close(&mut self, session: &Session, reason: CloseReason) {
        debug!("[-] {} ({})", session.addr(), reason);

        if let Some(player) = self.world.remove_player(&session.addr()) {
            info!("{} left the game ({})", player.username, reason);
            let remove = RemovePlayer {
                entity_id: player.entity_id,
                client_id: player.client_id,
            };
            self.queue(Recipients::AllExcept(session.addr()), remove.encode());
        }
    }

    fn on_data(&mut self, session: &mut Session, payload: &[u8]) {
        let Some(&first) = payload.first() else {
            return;
        };
        let id = match PacketId::try_from(first) {
            Ok(id) => id,
            Err(e) => {
                debug!("{} from {}", e, session.addr());
                return;
            }
        };

        if let Err(e) = self.handle_packet(session, id, payload) {
            warn!("Bad {:?} from {}: {}", id, session.addr(), e);
        }
    }

    fn on_tick(&mut self, sessions: &mut SessionTable) {
        for (recipients, payload) in self.outbox.drain(..) {
            match recipients {
                Recipients::All => sessions.broadcast(&payload),
                Recipients::AllExcept(addr) => sessions.broadcast_except(addr, &payload),
            }
        }
    }
}
