use std::collections::HashMap;
use std::net::SocketAddr;

use glam::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub addr: SocketAddr,
    pub client_id: i64,
    pub username: String,
    pub entity_id: i32,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

/// Players currently logged in, keyed by the session they arrived on.
#[derive(Debug)]
pub struct World {
    seed: i32,
    spawn: Vec3,
    time: i32,
    players: HashMap<SocketAddr, Player>,
    next_entity_id: i32,
}

impl World {
    pub fn new(seed: i32, spawn: Vec3, time: i32) -> Self {
        Self {
            seed,
            spawn,
            time,
            players: HashMap::new(),
            next_entity_id: 1,
        }
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    pub fn spawn(&self) -> Vec3 {
        self.spawn
    }

    pub fn time(&self) -> i32 {
        self.time
    }

    pub fn add_player(&mut self, addr: SocketAddr, client_id: i64, username: &str) -> &Player {
        let entity_id = self.next_entity_id;
        self.next_entity_id += 1;

        let spawn = self.spawn;
        self.players.entry(addr).or_insert_with(|| Player {
            addr,
            client_id,
            username: username.to_string(),
            entity_id,
            position: spawn,
            yaw: 0.0,
            pitch: 0.0,
        })
    }

    pub fn remove_player(&mut self, addr: &SocketAddr) -> Option<Player> {
        self.players.remove(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Player> {
        self.players.get(addr)
    }

    pub fn by_name(&self, username: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.username.eq_ignore_ascii_case(username))
    }

    /// Returns the moved player, or `None` if `addr` has not logged in.
    pub fn move_player(&mut self, addr: &SocketAddr, position: Vec3, yaw: f32, pitch: f32) -> Option<&Player> {
        let player = self.players.get_mut(addr)?;
        player.position = position;
        player.yaw = yaw;
        player.pitch = pitch;
        Some(player)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let mut world = World::new(1, Vec3::ZERO, 0);
        let a = world.add_player(addr(1), 10, "a").entity_id;
        let b = world.add_player(addr(2), 20, "b").entity_id;

        assert_ne!(a, b);
        assert_eq!(world.player_count(), 2);
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        let mut world = World::new(1, Vec3::ZERO, 0);
        world.add_player(addr(1), 10, "Steve");

        assert!(world.by_name("steve").is_some());
        assert!(world.by_name("alex").is_none());
    }

    #[test]
    fn test_move_and_remove() {
        let mut world = World::new(1, Vec3::ZERO, 0);
        world.add_player(addr(1), 10, "a");

        let moved = world
            .move_player(&addr(1), Vec3::new(1.0, 2.0, 3.0), 90.0, 10.0)
            .unwrap();
        assert_eq!(moved.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(world.move_player(&addr(2), Vec3::ZERO, 0.0, 0.0).is_none());

        assert_eq!(world.remove_player(&addr(1)).unwrap().client_id, 10);
        assert!(world.get(&addr(1)).is_none());
    }
}
