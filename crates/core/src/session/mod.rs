//! Client-side reconciliation: buffers server updates behind a small jitter
//! window, then nudges local state toward the server's authoritative values
//! instead of snapping or resimulating. See [`ClientSession::sync`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::constants::{
    GRAVITY_FACTOR, PLAYER_INTERRUPT_LIMIT, SERVER_SYNC_INTERVAL, START_RADIUS, TIMEOUT_LIMIT,
    VIEW_GROWTH_RATE,
};
use crate::entity::{Inputs, Orb, Player, Tracker};

const QUEUE_CAPACITY: usize = 256;
const PAST_PLAYER_CAPACITY: usize = 1024;

/// A snapshot of the local player's own state taken at send time, replayed
/// later as the "past" anchor for gravity correction once the matching
/// server update arrives.
#[derive(Debug, Clone, Copy)]
pub struct PastPlayerSample {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

struct PlayerUpdate {
    receive_time: f64,
    round_trip_time: f64,
    server_pulse: f64,
    leaders: Vec<String>,
    players: Vec<Player>,
}

struct OrbUpdate {
    receive_time: f64,
    packet_id: u32,
    additions: Vec<Orb>,
    removals: Vec<Orb>,
}

struct DeathUpdate {
    receive_time: f64,
    packet_id: u32,
    new_player_id: i64,
}

struct PastPlayerEntry {
    time: f64,
    sample: PastPlayerSample,
}

/// Messages the caller must actually put on the wire after a [`ClientSession::sync`]
/// call. Kept separate from transport so this module has no socket dependency.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    Inputs(Inputs),
    Ping(f64),
    Ack(u32),
}

/// Why the session stopped being connected, surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ServerInterrupted,
    Disconnected(String),
}

/// Tracks reconciliation state for one local connection to the authoritative
/// server. Holds no socket; callers feed it decoded messages and drain
/// [`OutgoingMessage`]s to send.
pub struct ClientSession {
    connected: bool,
    synced: bool,
    player_id: i64,
    heartbeat: f64,
    server_time: f64,
    latency: f64,
    leaders: Vec<String>,
    server_players: HashMap<i64, Player>,
    past_player: Option<PastPlayerSample>,
    player_update_queue: VecDeque<PlayerUpdate>,
    orb_update_queue: VecDeque<OrbUpdate>,
    death_queue: VecDeque<DeathUpdate>,
    past_player_queue: VecDeque<PastPlayerEntry>,
    acked_packets: HashSet<u32>,
    ack_expiry_queue: VecDeque<(f64, u32)>,
    end_state: Option<SessionEnd>,
}

impl ClientSession {
    pub fn new(player_id: i64, initial_player: Player, now: f64) -> Self {
        let mut server_players = HashMap::new();
        server_players.insert(player_id, initial_player);
        Self {
            connected: true,
            synced: false,
            player_id,
            heartbeat: 0.0,
            server_time: now,
            latency: 0.0,
            leaders: Vec::new(),
            server_players,
            past_player: None,
            player_update_queue: VecDeque::with_capacity(QUEUE_CAPACITY),
            orb_update_queue: VecDeque::with_capacity(QUEUE_CAPACITY),
            death_queue: VecDeque::with_capacity(QUEUE_CAPACITY),
            past_player_queue: VecDeque::with_capacity(PAST_PLAYER_CAPACITY),
            acked_packets: HashSet::new(),
            ack_expiry_queue: VecDeque::with_capacity(QUEUE_CAPACITY),
            end_state: None,
        }
    }

    pub fn player_id(&self) -> i64 {
        self.player_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn leaders(&self) -> &[String] {
        &self.leaders
    }

    pub fn end_state(&self) -> Option<&SessionEnd> {
        self.end_state.as_ref()
    }

    fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }

    /// Call when a `UPD_PLAYERS` frame is decoded. `round_trip_time` is the
    /// ping RTT measured for the pulse this update rides with.
    pub fn ingest_player_update(
        &mut self,
        now: f64,
        round_trip_time: f64,
        server_pulse: f64,
        leaders: Vec<String>,
        players: Vec<Player>,
    ) {
        Self::push_bounded(
            &mut self.player_update_queue,
            PlayerUpdate {
                receive_time: now,
                round_trip_time,
                server_pulse,
                leaders,
                players,
            },
            QUEUE_CAPACITY,
        );
    }

    /// Call when a `UPD_ORBS` frame is decoded (reliable: retransmitted by
    /// the sender until acked, so duplicates are expected and must be
    /// idempotent here).
    pub fn ingest_orb_update(
        &mut self,
        now: f64,
        packet_id: u32,
        additions: Vec<Orb>,
        removals: Vec<Orb>,
    ) {
        Self::push_bounded(
            &mut self.orb_update_queue,
            OrbUpdate {
                receive_time: now,
                packet_id,
                additions,
                removals,
            },
            QUEUE_CAPACITY,
        );
    }

    /// Call when a `DEATH` frame is decoded (reliable): the local player was
    /// eaten and assigned `new_player_id`.
    pub fn ingest_death(&mut self, now: f64, packet_id: u32, new_player_id: i64) {
        Self::push_bounded(
            &mut self.death_queue,
            DeathUpdate {
                receive_time: now,
                packet_id,
                new_player_id,
            },
            QUEUE_CAPACITY,
        );
    }

    pub fn ingest_disconnect(&mut self, reason: String) {
        self.connected = false;
        self.end_state = Some(SessionEnd::Disconnected(reason));
    }

    /// The main per-tick driver. Drains due queue entries, reconciles local
    /// `players`/`orbs` toward the server's view, updates `trackers` if
    /// given, and returns the messages the caller should send this tick.
    ///
    /// `players` and `orbs` are the client's locally rendered state; this
    /// mutates them in place rather than replacing them wholesale so
    /// unrelated client-only bookkeeping on those maps survives.
    pub fn sync(
        &mut self,
        now: f64,
        dt: f32,
        players: &mut HashMap<i64, Player>,
        orbs: &mut HashMap<u32, Orb>,
        trackers: Option<(&mut Tracker, &mut Tracker)>,
    ) -> Vec<OutgoingMessage> {
        let mut outgoing = Vec::new();

        self.drain_player_updates(now, players, &mut outgoing);
        self.drain_past_player_queue();
        self.acknowledge_updates(now, orbs, &mut outgoing);
        self.verify_connection(now, players);

        if self.synced {
            if let Some(player) = players.get(&self.player_id) {
                let sample = PastPlayerSample {
                    x: player.x,
                    y: player.y,
                    radius: player.radius,
                };
                Self::push_bounded(
                    &mut self.past_player_queue,
                    PastPlayerEntry { time: now, sample },
                    PAST_PLAYER_CAPACITY,
                );
                outgoing.push(OutgoingMessage::Inputs(player.inputs));
            }
            self.sync_player_positions(dt, players);
        }

        if let Some((server_tracker, past_tracker)) = trackers {
            self.update_trackers(server_tracker, past_tracker);
        }

        outgoing
    }

    fn drain_player_updates(
        &mut self,
        now: f64,
        players: &mut HashMap<i64, Player>,
        outgoing: &mut Vec<OutgoingMessage>,
    ) {
        while let Some(update) = self.player_update_queue.front() {
            if update.receive_time > now {
                break;
            }
            let update = self.player_update_queue.pop_front().unwrap();
            if update.server_pulse <= self.heartbeat {
                continue;
            }
            self.heartbeat = update.server_pulse;
            self.leaders = update.leaders;
            self.apply_player_update(players, update.players);

            let new_server_time = now - update.round_trip_time;
            self.server_time = self.server_time.max(new_server_time);
            self.latency = now - self.server_time;
            outgoing.push(OutgoingMessage::Ping(update.server_pulse));
        }
    }

    fn apply_player_update(&mut self, players: &mut HashMap<i64, Player>, new_players: Vec<Player>) {
        self.server_players = new_players.into_iter().map(|p| (p.id, p)).collect();

        for (id, player) in &self.server_players {
            players.entry(*id).or_insert_with(|| player.clone());
        }

        let stale: Vec<i64> = players
            .keys()
            .copied()
            .filter(|id| *id != self.player_id && !self.server_players.contains_key(id))
            .collect();
        for id in stale {
            players.remove(&id);
        }
    }

    fn drain_past_player_queue(&mut self) {
        let effective_server_time = self.server_time - SERVER_SYNC_INTERVAL / 2.0;
        while let Some(entry) = self.past_player_queue.front() {
            if entry.time > effective_server_time {
                break;
            }
            let entry = self.past_player_queue.pop_front().unwrap();
            self.past_player = Some(entry.sample);
        }
    }

    fn ack(&mut self, now: f64, packet_id: u32) {
        self.ack_expiry_queue.push_back((now, packet_id));
        self.acked_packets.insert(packet_id);
    }

    fn acknowledge_updates(
        &mut self,
        now: f64,
        orbs: &mut HashMap<u32, Orb>,
        outgoing: &mut Vec<OutgoingMessage>,
    ) {
        while let Some(&(sent_at, packet_id)) = self.ack_expiry_queue.front() {
            if now - sent_at < TIMEOUT_LIMIT {
                break;
            }
            self.ack_expiry_queue.pop_front();
            self.acked_packets.remove(&packet_id);
        }

        while let Some(death) = self.death_queue.front() {
            if death.receive_time > now {
                break;
            }
            let death = self.death_queue.pop_front().unwrap();
            outgoing.push(OutgoingMessage::Ack(death.packet_id));
            if self.acked_packets.contains(&death.packet_id) {
                continue;
            }
            self.player_id = death.new_player_id;
            self.synced = false;
            self.ack(now, death.packet_id);
        }

        let mut due_orb_updates: Vec<(u32, OrbUpdate)> = Vec::new();
        while let Some(update) = self.orb_update_queue.front() {
            if update.receive_time > now {
                break;
            }
            let update = self.orb_update_queue.pop_front().unwrap();
            due_orb_updates.push((update.packet_id, update));
        }
        due_orb_updates.sort_by_key(|(id, _)| *id);

        for (packet_id, update) in due_orb_updates {
            if self.acked_packets.contains(&packet_id) {
                outgoing.push(OutgoingMessage::Ack(packet_id));
                continue;
            }
            let removals_present = update.removals.iter().all(|orb| orbs.contains_key(&orb.id));
            let additions_absent = update.additions.iter().all(|orb| !orbs.contains_key(&orb.id));
            if removals_present && additions_absent {
                for orb in update.additions {
                    orbs.insert(orb.id, orb);
                }
                for orb in update.removals {
                    orbs.remove(&orb.id);
                }
                outgoing.push(OutgoingMessage::Ack(packet_id));
                self.ack(now, packet_id);
            }
        }
    }

    fn verify_connection(&mut self, now: f64, players: &mut HashMap<i64, Player>) {
        if now - self.server_time > TIMEOUT_LIMIT {
            self.connected = false;
            self.end_state = Some(SessionEnd::ServerInterrupted);
            return;
        }

        let server_delay = now - self.server_time;
        let synchronized =
            server_delay <= PLAYER_INTERRUPT_LIMIT && self.server_players.contains_key(&self.player_id);

        if !self.synced && synchronized {
            self.reset_players(players);
        }
        self.synced = synchronized;
    }

    fn reset_players(&mut self, players: &mut HashMap<i64, Player>) {
        for (id, player) in players.iter_mut() {
            let Some(server_player) = self.server_players.get(id) else {
                continue;
            };
            player.x = server_player.x;
            player.y = server_player.y;
            player.color_idx = server_player.color_idx;
        }
        self.past_player = None;
        self.past_player_queue.clear();
    }

    /// Nudges every locally known player toward its server counterpart by a
    /// proportional amount rather than snapping, so the local view stays
    /// smooth even under jitter. The local player reconciles against its
    /// delayed past sample instead of its live (already-predicted) position,
    /// which is what keeps local input responsive despite the correction.
    fn sync_player_positions(&mut self, dt: f32, players: &mut HashMap<i64, Player>) {
        let gravity = GRAVITY_FACTOR * dt;
        for (id, player) in players.iter_mut() {
            let Some(server_player) = self.server_players.get(id) else {
                continue;
            };

            if *id != self.player_id {
                player.inputs = server_player.inputs;
            }

            if (player.radius - server_player.radius).abs() > f32::EPSILON {
                player.radius = server_player.radius;
                player.scale = (player.radius / START_RADIUS).powf(VIEW_GROWTH_RATE);
            }

            if *id == self.player_id {
                if let Some(past) = self.past_player {
                    player.x += gravity * (server_player.x - past.x);
                    player.y += gravity * (server_player.y - past.y);
                    continue;
                }
            }
            player.x += gravity * (server_player.x - player.x);
            player.y += gravity * (server_player.y - player.y);
        }
    }

    fn update_trackers(&self, server_tracker: &mut Tracker, past_tracker: &mut Tracker) {
        if let Some(server_player) = self.server_players.get(&self.player_id) {
            server_tracker.update(server_player.x, server_player.y, server_player.radius);
        }
        match self.past_player {
            Some(past) => past_tracker.update(past.x, past.y, past.radius),
            None => past_tracker.hide(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64, x: f32, y: f32) -> Player {
        Player::new(id, "p".into(), x, y, 0)
    }

    #[test]
    fn ingest_and_sync_applies_player_update() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        let mut players = HashMap::new();
        players.insert(1, player(1, 0.0, 0.0));
        let mut orbs = HashMap::new();

        session.ingest_player_update(0.0, 0.05, 1.0, vec![], vec![player(1, 10.0, 10.0)]);
        let _ = session.sync(0.0, 0.016, &mut players, &mut orbs, None);

        assert!(session.is_synced());
        assert_eq!(session.server_players.get(&1).unwrap().x, 10.0);
    }

    #[test]
    fn stale_heartbeat_updates_are_ignored() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        let mut players = HashMap::new();
        players.insert(1, player(1, 0.0, 0.0));
        let mut orbs = HashMap::new();

        session.ingest_player_update(0.0, 0.0, 5.0, vec![], vec![player(1, 1.0, 1.0)]);
        session.sync(0.0, 0.016, &mut players, &mut orbs, None);
        session.ingest_player_update(0.0, 0.0, 3.0, vec![], vec![player(1, 99.0, 99.0)]);
        session.sync(0.0, 0.016, &mut players, &mut orbs, None);

        assert_eq!(session.server_players.get(&1).unwrap().x, 1.0);
    }

    #[test]
    fn gravity_correction_moves_local_player_toward_past_anchored_server_position() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        session.synced = true;
        session.server_players.insert(1, player(1, 100.0, 0.0));
        session.past_player = Some(PastPlayerSample {
            x: 50.0,
            y: 0.0,
            radius: START_RADIUS,
        });

        let mut players = HashMap::new();
        players.insert(1, player(1, 50.0, 0.0));

        session.sync_player_positions(0.1, &mut players);

        assert!(players[&1].x > 50.0);
        assert!(players[&1].x < 100.0);
    }

    #[test]
    fn orb_update_requires_consistent_prior_state_before_applying() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        let mut players = HashMap::new();
        players.insert(1, player(1, 0.0, 0.0));
        let mut orbs = HashMap::new();
        orbs.insert(1, Orb::new(1, 0.0, 0.0, 20.0, 0));

        session.ingest_player_update(0.0, 0.0, 1.0, vec![], vec![player(1, 0.0, 0.0)]);
        session.sync(0.0, 0.0, &mut players, &mut orbs, None);

        let addition = Orb::new(2, 5.0, 5.0, 20.0, 0);
        let removal = Orb::new(1, 0.0, 0.0, 20.0, 0);
        session.ingest_orb_update(0.0, 1, vec![addition], vec![removal]);
        let outgoing = session.sync(0.0, 0.0, &mut players, &mut orbs, None);

        assert!(orbs.contains_key(&2));
        assert!(!orbs.contains_key(&1));
        assert!(outgoing
            .iter()
            .any(|m| matches!(m, OutgoingMessage::Ack(1))));
    }

    #[test]
    fn death_reassigns_local_player_id_and_desyncs() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        let mut players = HashMap::new();
        players.insert(1, player(1, 0.0, 0.0));
        let mut orbs = HashMap::new();

        session.ingest_player_update(0.0, 0.0, 1.0, vec![], vec![player(1, 0.0, 0.0)]);
        session.sync(0.0, 0.0, &mut players, &mut orbs, None);
        assert!(session.is_synced());

        session.ingest_death(0.0, 1, 2);
        session.sync(0.0, 0.0, &mut players, &mut orbs, None);

        assert_eq!(session.player_id(), 2);
        assert!(!session.is_synced());
    }

    #[test]
    fn long_silence_marks_connection_interrupted() {
        let mut session = ClientSession::new(1, player(1, 0.0, 0.0), 0.0);
        let mut players = HashMap::new();
        players.insert(1, player(1, 0.0, 0.0));
        let mut orbs = HashMap::new();

        session.sync(TIMEOUT_LIMIT + 1.0, 0.016, &mut players, &mut orbs, None);
        assert!(!session.is_connected());
        assert_eq!(session.end_state(), Some(&SessionEnd::ServerInterrupted));
    }
}
