//! The authoritative simulation: player/orb state, the spatial grid, and the
//! per-tick sequence of move -> collide -> replenish -> steer-bots.

use std::collections::HashMap;
use std::net::SocketAddr;

use rand::Rng;

use crate::constants::{
    BASE_HEIGHT, BASE_WIDTH, BOT_FEED_RANDOMIZE_CHANCE, BOT_INPUT_RANDOMIZE_CHANCE, BOT_NAMES,
    COLLISION_MARGIN, MAP_CELL_HEIGHT, MAP_CELL_WIDTH, MAX_ORB_RADIUS, MIN_ORB_RADIUS,
    PALETTE_SIZE, PLAYER_LIMIT, START_RADIUS,
};
use crate::entity::{Inputs, Orb, Player};
use crate::error::{GloopError, Result};
use crate::grid::SpatialGrid;

use super::view::{diff_orb_view, OrbViewDiff, PlayerSession};

fn player_key(id: i64) -> u64 {
    id as u64
}

fn orb_key(id: u32) -> u64 {
    id as u64
}

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub field_width: f32,
    pub field_height: f32,
    pub target_orb_count: usize,
    pub bot_count: usize,
    pub player_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            field_width: BASE_WIDTH,
            field_height: BASE_HEIGHT,
            target_orb_count: 200,
            bot_count: 0,
            player_limit: PLAYER_LIMIT,
        }
    }
}

/// A human player was eaten and respawned under a fresh id; the caller must
/// notify that connection so it can rebind.
#[derive(Debug, Clone, Copy)]
pub struct DeathNotice {
    pub old_id: i64,
    pub new_id: i64,
}

pub struct ServerWorld {
    config: WorldConfig,
    players: HashMap<i64, Player>,
    orbs: HashMap<u32, Orb>,
    player_grid: SpatialGrid,
    orb_grid: SpatialGrid,
    sessions: HashMap<i64, PlayerSession>,
    next_player_id: i64,
    next_bot_id: i64,
    next_orb_id: u32,
}

impl ServerWorld {
    pub fn new(config: WorldConfig) -> Self {
        let player_grid = SpatialGrid::new(
            config.field_width,
            config.field_height,
            MAP_CELL_WIDTH,
            MAP_CELL_HEIGHT,
        );
        let orb_grid = SpatialGrid::new(
            config.field_width,
            config.field_height,
            MAP_CELL_WIDTH,
            MAP_CELL_HEIGHT,
        );

        let mut world = Self {
            config,
            players: HashMap::new(),
            orbs: HashMap::new(),
            player_grid,
            orb_grid,
            sessions: HashMap::new(),
            next_player_id: 1,
            next_bot_id: -1,
            next_orb_id: 1,
        };

        for _ in 0..world.config.bot_count {
            world.spawn_bot();
        }
        world.replenish_orbs();
        world
    }

    pub fn field_size(&self) -> (f32, f32) {
        (self.config.field_width, self.config.field_height)
    }

    pub fn player(&self, id: i64) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn session(&self, id: i64) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&i64, &PlayerSession)> {
        self.sessions.iter()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn orb_count(&self) -> usize {
        self.orbs.len()
    }

    /// Admits a new human connection, spawning a fresh player at a free
    /// location. Rejects with `Rejected` if the server is full.
    pub fn add_human_player(&mut self, name: String, addr: SocketAddr, now: f64) -> Result<i64> {
        if self.sessions.len() >= self.config.player_limit {
            return Err(GloopError::Rejected {
                reason: crate::constants::SERVER_FULL_MESSAGE.to_string(),
            });
        }

        let id = self.next_player_id;
        self.next_player_id += 1;

        let (x, y) = self.spawn_location();
        let color_idx = rand::thread_rng().gen_range(0..PALETTE_SIZE);
        let player = Player::new(id, name, x, y, color_idx);
        self.player_grid.insert(player_key(id), player.aabb());
        self.players.insert(id, player);
        self.sessions.insert(id, PlayerSession::new(addr, now));

        Ok(id)
    }

    pub fn remove_player(&mut self, id: i64) {
        if let Some(player) = self.players.remove(&id) {
            self.player_grid.remove(player_key(id), player.aabb());
        }
        self.sessions.remove(&id);
    }

    pub fn apply_inputs(&mut self, id: i64, inputs: Inputs) {
        if let Some(player) = self.players.get_mut(&id) {
            player.inputs = inputs;
        }
    }

    fn spawn_bot(&mut self) {
        let id = self.next_bot_id;
        self.next_bot_id -= 1;
        let name = BOT_NAMES[(-id as usize - 1) % BOT_NAMES.len()].to_string();
        let (x, y) = self.spawn_location();
        let color_idx = rand::thread_rng().gen_range(0..PALETTE_SIZE);
        let mut bot = Player::new(id, name, x, y, color_idx);
        bot.radius = rand::thread_rng().gen_range(START_RADIUS..(crate::constants::MAX_RADIUS / 3.0));
        bot.recompute_scale();
        self.player_grid.insert(player_key(id), bot.aabb());
        self.players.insert(id, bot);
    }

    /// Rejection-samples a location not overlapping any player already in
    /// the landing cell. Only checks the exact cell, not neighbours — a
    /// cheap approximation that is good enough because cells are large
    /// relative to player radii in typical play.
    fn spawn_location(&self) -> (f32, f32) {
        let mut rng = rand::thread_rng();
        loop {
            let x = rng.gen_range(0.0..self.config.field_width);
            let y = rng.gen_range(0.0..self.config.field_height);

            let occupants = self.player_grid.cell_members(x, y);
            let clear = occupants.iter().all(|&key| {
                let id = key as i64;
                match self.players.get(&id) {
                    Some(p) => p.find_distance(x, y) > p.radius,
                    None => true,
                }
            });

            if clear {
                return (x, y);
            }
        }
    }

    fn random_orb(&mut self) -> Orb {
        let mut rng = rand::thread_rng();
        let id = self.next_orb_id;
        self.next_orb_id = self.next_orb_id.wrapping_add(1);
        let x = rng.gen_range(0.0..self.config.field_width);
        let y = rng.gen_range(0.0..self.config.field_height);
        let radius = rng.gen_range(MIN_ORB_RADIUS..=MAX_ORB_RADIUS);
        let color_idx = rng.gen_range(0..PALETTE_SIZE);
        Orb::new(id, x, y, radius, color_idx)
    }

    fn replenish_orbs(&mut self) {
        while self.orbs.len() < self.config.target_orb_count {
            let orb = self.random_orb();
            self.orb_grid.insert(orb_key(orb.id), orb.aabb());
            self.orbs.insert(orb.id, orb);
        }
    }

    /// Advances the whole simulation by `dt` seconds: move, resolve
    /// collisions, replenish, steer bots. Returns notices for any human
    /// players that died this tick (new id assigned, caller must notify).
    pub fn tick(&mut self, dt: f32, now: f64) -> Vec<DeathNotice> {
        self.move_players(dt);
        let deaths = self.resolve_player_collisions(now);
        self.resolve_orb_collisions();
        self.replenish_orbs();
        self.steer_bots();
        deaths
    }

    fn move_players(&mut self, dt: f32) {
        let ids: Vec<i64> = self.players.keys().copied().collect();
        let (fw, fh) = self.field_size();
        for id in ids {
            let old_aabb = self.players[&id].aabb();
            let player = self.players.get_mut(&id).unwrap();
            player.apply_move(dt, fw, fh);
            let new_aabb = player.aabb();
            self.player_grid.remove(player_key(id), old_aabb);
            self.player_grid.insert(player_key(id), new_aabb);
        }
    }

    /// Larger player eats smaller neighbour when the gap between their edges
    /// (less a margin proportional to the eater's own radius) closes. Equal
    /// radii never eat each other.
    fn resolve_player_collisions(&mut self, now: f64) -> Vec<DeathNotice> {
        let mut eaten: Vec<(i64, i64, f32)> = Vec::new(); // (eater, victim, victim_radius)
        let mut consumed: std::collections::HashSet<i64> = std::collections::HashSet::new();

        let ids: Vec<i64> = self.players.keys().copied().collect();
        for &pid in &ids {
            if consumed.contains(&pid) {
                continue;
            }
            let p = &self.players[&pid];
            let neighbours = self.player_grid.query(p.x, p.y, p.radius, p.radius);
            for key in neighbours {
                let qid = key as i64;
                if qid == pid || consumed.contains(&qid) {
                    continue;
                }
                let Some(q) = self.players.get(&qid) else {
                    continue;
                };
                if q.radius >= p.radius {
                    continue;
                }
                let margin = q.radius * COLLISION_MARGIN;
                if p.find_distance(q.x, q.y) < p.radius - margin {
                    eaten.push((pid, qid, q.radius));
                    consumed.insert(qid);
                }
            }
        }

        let mut notices = Vec::new();
        for (eater, victim_id, victim_radius) in eaten {
            if let Some(eater_player) = self.players.get_mut(&eater) {
                eater_player.eat(victim_radius);
            }
            notices.extend(self.respawn_eaten_player(victim_id, now));
        }
        notices
    }

    fn respawn_eaten_player(&mut self, id: i64, now: f64) -> Option<DeathNotice> {
        let was_bot = id < 0;
        let old_aabb = self.players.get(&id)?.aabb();
        self.player_grid.remove(player_key(id), old_aabb);

        let (x, y) = self.spawn_location();
        let color_idx = rand::thread_rng().gen_range(0..PALETTE_SIZE);

        if was_bot {
            let new_id = self.next_bot_id;
            self.next_bot_id -= 1;
            let name = BOT_NAMES[(-new_id as usize - 1) % BOT_NAMES.len()].to_string();
            self.players.remove(&id);
            let bot = Player::new(new_id, name, x, y, color_idx);
            self.player_grid.insert(player_key(new_id), bot.aabb());
            self.players.insert(new_id, bot);
            None
        } else {
            let name = self.players.get(&id).unwrap().name.clone();
            self.players.remove(&id);
            let session = self.sessions.remove(&id);

            let new_id = self.next_player_id;
            self.next_player_id += 1;
            let player = Player::new(new_id, name, x, y, color_idx);
            self.player_grid.insert(player_key(new_id), player.aabb());
            self.players.insert(new_id, player);

            if let Some(mut session) = session {
                session.orb_view.clear();
                self.sessions.insert(new_id, session);
            } else {
                self.sessions.insert(new_id, PlayerSession::new(
                    "0.0.0.0:0".parse().unwrap(),
                    now,
                ));
            }

            Some(DeathNotice {
                old_id: id,
                new_id,
            })
        }
    }

    fn resolve_orb_collisions(&mut self) {
        let ids: Vec<i64> = self.players.keys().copied().collect();
        let mut eaten_orbs: Vec<u32> = Vec::new();
        let mut growth: Vec<(i64, f32)> = Vec::new();

        for pid in ids {
            let p = &self.players[&pid];
            let neighbours = self.orb_grid.query(p.x, p.y, p.radius, p.radius);
            for key in neighbours {
                let oid = key as u32;
                if eaten_orbs.contains(&oid) {
                    continue;
                }
                let Some(orb) = self.orbs.get(&oid) else {
                    continue;
                };
                let margin = orb.radius * COLLISION_MARGIN;
                if p.find_distance(orb.x, orb.y) <= p.radius - margin {
                    eaten_orbs.push(oid);
                    growth.push((pid, orb.radius));
                }
            }
        }

        for oid in &eaten_orbs {
            if let Some(orb) = self.orbs.remove(oid) {
                self.orb_grid.remove(orb_key(*oid), orb.aabb());
            }
        }

        for (pid, radius) in growth {
            if let Some(p) = self.players.get_mut(&pid) {
                p.eat(radius);
                if p.is_bot() && rand::thread_rng().gen_range(0..BOT_FEED_RANDOMIZE_CHANCE) == 0 {
                    Self::randomize_bot_inputs(p, self.config.field_width, self.config.field_height);
                }
            }
        }
    }

    fn steer_bots(&mut self) {
        let (fw, fh) = self.field_size();
        for player in self.players.values_mut() {
            if player.is_bot()
                && rand::thread_rng().gen_range(0..BOT_INPUT_RANDOMIZE_CHANCE) == 0
            {
                Self::randomize_bot_inputs(player, fw, fh);
            }
        }
    }

    /// Picks a random target point, biased to pull the bot back toward the
    /// map center when it has drifted far, and aims its inputs there.
    fn randomize_bot_inputs(bot: &mut Player, field_width: f32, field_height: f32) {
        let mut rng = rand::thread_rng();
        let center_x = field_width / 2.0;
        let center_y = field_height / 2.0;
        let bias_x = (bot.x - center_x) * 0.5;
        let bias_y = (bot.y - center_y) * 0.5;

        let target_x = rng.gen_range(-field_width / 2.0..field_width / 2.0) - bias_x;
        let target_y = rng.gen_range(-field_height / 2.0..field_height / 2.0) - bias_y;
        bot.inputs = Inputs::new(target_x, target_y);
    }

    /// Computes the set of players and the orb-view diff visible to `id`,
    /// updating that player's session's `orb_view` in place.
    pub fn compute_view(&mut self, id: i64) -> Option<(Vec<Player>, OrbViewDiff)> {
        let player = self.players.get(&id)?.clone();
        let session = self.sessions.get(&id)?;
        let (rx, ry) = session.view_extents(player.scale);

        let player_keys = self.player_grid.query(player.x, player.y, rx, ry);
        let visible_players: Vec<Player> = player_keys
            .into_iter()
            .filter_map(|key| self.players.get(&(key as i64)))
            .filter(|p| p.find_distance(player.x, player.y) <= rx.max(ry))
            .cloned()
            .collect();

        let orb_keys = self.orb_grid.query(player.x, player.y, rx, ry);
        let visible_orbs: std::collections::HashSet<u32> = orb_keys
            .into_iter()
            .map(|key| key as u32)
            .filter(|oid| self.orbs.contains_key(oid))
            .collect();

        let session = self.sessions.get_mut(&id)?;
        let diff = diff_orb_view(&session.orb_view, &visible_orbs);
        session.orb_view = visible_orbs;

        Some((visible_players, diff))
    }

    pub fn orb(&self, id: u32) -> Option<&Orb> {
        self.orbs.get(&id)
    }

    pub fn touch_session(&mut self, id: i64, now: f64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_pulse_time = now;
        }
    }

    pub fn set_rtt(&mut self, id: i64, rtt: f64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_rtt = rtt;
        }
    }

    /// Ids whose last pulse is older than `TIMEOUT_LIMIT` — the caller should
    /// drop these connections and free their player.
    pub fn timed_out_sessions(&self, now: f64) -> Vec<i64> {
        self.sessions
            .iter()
            .filter(|(_, s)| now - s.last_pulse_time > crate::constants::TIMEOUT_LIMIT)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Ids that are laggy but not yet timed out — the caller should freeze
    /// their inputs rather than let them drift on stale data.
    pub fn interrupted_sessions(&self, now: f64) -> Vec<i64> {
        self.sessions
            .iter()
            .filter(|(_, s)| {
                let age = now - s.last_pulse_time;
                age > crate::constants::PLAYER_INTERRUPT_LIMIT
                    && age <= crate::constants::TIMEOUT_LIMIT
            })
            .map(|(&id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn add_player_respects_limit() {
        let mut world = ServerWorld::new(WorldConfig {
            player_limit: 1,
            target_orb_count: 0,
            ..Default::default()
        });
        assert!(world.add_human_player("a".into(), addr(), 0.0).is_ok());
        assert!(world.add_human_player("b".into(), addr(), 0.0).is_err());
    }

    #[test]
    fn orbs_replenish_to_target() {
        let world = ServerWorld::new(WorldConfig {
            target_orb_count: 50,
            ..Default::default()
        });
        assert_eq!(world.orb_count(), 50);
    }

    fn relocate(world: &mut ServerWorld, id: i64, x: f32, y: f32, radius: f32) {
        let old_aabb = world.players[&id].aabb();
        let p = world.players.get_mut(&id).unwrap();
        p.x = x;
        p.y = y;
        p.radius = radius;
        p.recompute_scale();
        let new_aabb = p.aabb();
        world.player_grid.remove(player_key(id), old_aabb);
        world.player_grid.insert(player_key(id), new_aabb);
    }

    #[test]
    fn larger_player_eats_smaller_neighbour() {
        let mut world = ServerWorld::new(WorldConfig {
            target_orb_count: 0,
            ..Default::default()
        });
        let a = world.add_human_player("a".into(), addr(), 0.0).unwrap();
        let b = world.add_human_player("b".into(), addr(), 0.0).unwrap();

        relocate(&mut world, a, 100.0, 100.0, 100.0);
        relocate(&mut world, b, 110.0, 100.0, 50.0);

        let notices = world.resolve_player_collisions(0.0);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].old_id, b);
        assert!(!world.players.contains_key(&b));
        assert!(world.players[&a].radius > 100.0);
    }

    #[test]
    fn equal_radius_players_do_not_eat_each_other() {
        let mut world = ServerWorld::new(WorldConfig {
            target_orb_count: 0,
            ..Default::default()
        });
        let a = world.add_human_player("a".into(), addr(), 0.0).unwrap();
        let b = world.add_human_player("b".into(), addr(), 0.0).unwrap();

        relocate(&mut world, a, 100.0, 100.0, 80.0);
        relocate(&mut world, b, 110.0, 100.0, 80.0);

        let notices = world.resolve_player_collisions(0.0);
        assert!(notices.is_empty());
    }
}
