use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gloop::codec::{
    self, Cursor, MessageCode, PacketHeader, HEADER_LEN, MAX_PACKET_SIZE,
};
use gloop::{
    GloopError, NetworkEndpoint, NetworkStats, PacketLossSimulation, ReceiveTracker,
    ReliableOutbox, ServerWorld, WorldConfig,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};

struct PeerState {
    addr: SocketAddr,
    send_seq: u32,
    recv_tracker: ReceiveTracker,
    name: String,
}

/// Everything the reader thread, the ack/retransmit thread, and the main
/// simulation tick need to touch. Guarded by a single mutex, the simplest
/// correct way to share it across the three contexts.
struct Shared {
    world: ServerWorld,
    endpoint: NetworkEndpoint,
    peers: HashMap<i64, PeerState>,
    addr_to_id: HashMap<SocketAddr, i64>,
    outbox: ReliableOutbox,
    next_packet_id: u32,
    packet_loss: Option<PacketLossSimulation>,
    pending_events: VecDeque<ServerEvent>,
    player_limit: usize,
}

impl Shared {
    fn now(&self, start: Instant) -> f64 {
        start.elapsed().as_secs_f64()
    }

    fn alloc_packet_id(&mut self) -> u32 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        id
    }

    fn send_framed(&mut self, to: SocketAddr, code: MessageCode, body: &[u8]) {
        let peer_id = self.addr_to_id.get(&to).copied();
        let (ack, ack_bitfield, seq) = if let Some(id) = peer_id {
            let peer = self.peers.get_mut(&id).unwrap();
            let (ack, bitfield) = peer.recv_tracker.ack_data();
            let seq = peer.send_seq;
            peer.send_seq = peer.send_seq.wrapping_add(1);
            (ack, bitfield, seq)
        } else {
            (0, 0, 0)
        };

        let mut buf = Vec::with_capacity(HEADER_LEN + 1 + body.len());
        PacketHeader::new(seq, ack, ack_bitfield).write(&mut buf);
        buf.push(code as u8);
        buf.extend_from_slice(body);

        if buf.len() > MAX_PACKET_SIZE {
            log::warn!("dropping oversized frame ({} bytes) to {}", buf.len(), to);
            return;
        }

        let sim = self.packet_loss.clone();
        match self.endpoint.send_to(&buf, to, sim.as_ref()) {
            Ok(_) => {
                if code.is_reliable() {
                    let packet_id = Cursor::new(body).read_u32().unwrap_or(0);
                    self.outbox.track(packet_id, to, buf);
                }
            }
            Err(e) => {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("send to {} failed: {}", to, e),
                });
            }
        }
    }
}

pub struct GameServer {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    start_time: Instant,
    tick_duration: Duration,
    accumulator: Duration,
    last_tick_time: Instant,
    tick: u64,
    local_addr: SocketAddr,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind(bind_addr)?;
        let local_addr = endpoint.local_addr();

        let world = ServerWorld::new(WorldConfig {
            field_width: config.map_width,
            field_height: config.map_height,
            target_orb_count: config.target_orb_count,
            bot_count: config.bot_count,
            player_limit: config.player_limit,
        });

        let shared = Arc::new(Mutex::new(Shared {
            world,
            endpoint,
            peers: HashMap::new(),
            addr_to_id: HashMap::new(),
            outbox: ReliableOutbox::new(),
            next_packet_id: 1,
            packet_loss: config.global_packet_loss,
            pending_events: VecDeque::new(),
            player_limit: config.player_limit,
        }));

        let running = Arc::new(AtomicBool::new(true));
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate);

        let server = Self {
            shared,
            running,
            start_time: Instant::now(),
            tick_duration,
            accumulator: Duration::ZERO,
            last_tick_time: Instant::now(),
            tick: 0,
            local_addr,
        };

        server.spawn_reader_thread();
        server.spawn_ack_thread();

        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn spawn_reader_thread(&self) {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let start = self.start_time;

        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                {
                    let mut shared = shared.lock().unwrap();
                    let sim = shared.packet_loss.clone();
                    match shared.endpoint.receive(sim.as_ref()) {
                        Ok(datagrams) => {
                            for (payload, addr) in datagrams {
                                let now = shared.now(start);
                                handle_datagram(&mut shared, &payload, addr, now);
                            }
                        }
                        Err(e) => {
                            shared.pending_events.push_back(ServerEvent::Error {
                                message: format!("receive failed: {}", e),
                            });
                        }
                    }
                    let _ = shared.endpoint.flush_outbound();
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        });
    }

    fn spawn_ack_thread(&self) {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs_f64(gloop::constants::ACK_INTERVAL);
        let timeout = Duration::from_secs_f64(gloop::constants::TIMEOUT_LIMIT);

        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                let mut shared = shared.lock().unwrap();
                let pending = shared.outbox.all_pending();
                let sim = shared.packet_loss.clone();
                for (_, addr, payload) in pending {
                    if let Err(e) = shared.endpoint.send_to(&payload, addr, sim.as_ref()) {
                        log::warn!("retransmit to {} failed: {}", addr, e);
                    }
                }
                let reaped = shared.outbox.reap_timed_out(timeout);
                if !reaped.is_empty() {
                    log::debug!("reaped {} stale reliable packets", reaped.len());
                }
            }
        });
    }

    /// Advances the fixed-timestep simulation by however many whole ticks
    /// have elapsed since the previous call, then ships updated views.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.simulate_tick();
            self.tick += 1;
        }
    }

    fn simulate_tick(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        let now = shared.now(self.start_time);
        let dt = self.tick_duration.as_secs_f32();

        let deaths = shared.world.tick(dt, now);
        for notice in deaths {
            if let Some(mut peer) = shared.peers.remove(&notice.old_id) {
                let addr = peer.addr;
                peer.send_seq = 0;
                shared.peers.insert(notice.new_id, peer);
                shared.addr_to_id.insert(addr, notice.new_id);

                let packet_id = shared.alloc_packet_id();
                let mut body = Vec::new();
                codec::encode_death(&mut body, packet_id, notice.new_id);
                shared.send_framed(addr, MessageCode::Death, &body);

                shared.pending_events.push_back(ServerEvent::Error {
                    message: format!("player {} was eaten, reassigned {}", notice.old_id, notice.new_id),
                });
            }
        }

        for id in shared.world.interrupted_sessions(now) {
            shared.world.apply_inputs(id, gloop::Inputs::ZERO);
        }

        let timed_out = shared.world.timed_out_sessions(now);
        for id in timed_out {
            shared.world.remove_player(id);
            if let Some(peer) = shared.peers.remove(&id) {
                shared.addr_to_id.remove(&peer.addr);
                shared.pending_events.push_back(ServerEvent::ClientDisconnected {
                    player_id: id,
                    reason: DisconnectReason::Timeout,
                });
            }
        }

        let ids: Vec<i64> = shared.peers.keys().copied().collect();
        let leaders = top_leaders(&shared.world, &ids);
        let (field_width, field_height) = shared.world.field_size();

        for id in ids {
            let Some((visible_players, orb_diff)) = shared.world.compute_view(id) else {
                continue;
            };
            let Some(session) = shared.world.session(id) else {
                continue;
            };
            let player_ping = session.last_rtt;
            let addr = shared.peers[&id].addr;

            let mut body = Vec::new();
            codec::encode_upd_players(
                &mut body,
                now,
                player_ping,
                &leaders,
                &visible_players,
                field_width as u32,
                field_height as u32,
            );
            shared.send_framed(addr, MessageCode::UpdPlayers, &body);

            if !orb_diff.is_empty() {
                let additions: Vec<_> = orb_diff
                    .additions
                    .iter()
                    .filter_map(|oid| shared.world.orb(*oid).copied())
                    .collect();
                let removals: Vec<_> = orb_diff
                    .removals
                    .iter()
                    .filter_map(|oid| shared.world.orb(*oid).copied())
                    .collect();

                // A diff with more orbs than fit in one datagram is split into
                // several UPD_ORBS shards, each with its own packet_id so it
                // acks/retransmits independently of the others.
                let shard_capacity = codec::max_orbs_per_upd_orbs_shard().max(1);
                let mut combined: Vec<(bool, gloop::Orb)> =
                    Vec::with_capacity(additions.len() + removals.len());
                combined.extend(additions.into_iter().map(|o| (true, o)));
                combined.extend(removals.into_iter().map(|o| (false, o)));

                for shard in combined.chunks(shard_capacity) {
                    let shard_additions: Vec<_> =
                        shard.iter().filter(|(is_add, _)| *is_add).map(|(_, o)| *o).collect();
                    let shard_removals: Vec<_> =
                        shard.iter().filter(|(is_add, _)| !*is_add).map(|(_, o)| *o).collect();
                    let packet_id = shared.alloc_packet_id();
                    let mut body = Vec::new();
                    codec::encode_upd_orbs(&mut body, packet_id, &shard_additions, &shard_removals);
                    shared.send_framed(addr, MessageCode::UpdOrbs, &body);
                }
            }
        }

        let _ = shared.endpoint.flush_outbound();
    }

    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        let mut shared = self.shared.lock().unwrap();
        shared.pending_events.drain(..).collect()
    }

    pub fn kick_client(&mut self, player_id: i64) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(peer) = shared.peers.remove(&player_id) {
            shared.world.remove_player(player_id);
            shared.addr_to_id.remove(&peer.addr);
            let mut body = Vec::new();
            codec::encode_disconnect_notice(&mut body, "Kicked by server operator.");
            shared.send_framed(peer.addr, MessageCode::Disconnect, &body);
            shared.pending_events.push_back(ServerEvent::ClientDisconnected {
                player_id,
                reason: DisconnectReason::Kicked,
            });
        }
    }

    pub fn shutdown_connections(&mut self) {
        let ids: Vec<i64> = {
            let shared = self.shared.lock().unwrap();
            shared.peers.keys().copied().collect()
        };
        for id in ids {
            self.kick_client(id);
        }
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown_connections();
    }

    pub fn stats(&self) -> ServerStats {
        let shared = self.shared.lock().unwrap();
        ServerStats {
            tick: self.tick,
            uptime_secs: self.start_time.elapsed().as_secs(),
            client_count: shared.peers.len(),
            player_limit: shared.player_limit,
            player_count: shared.world.player_count(),
            orb_count: shared.world.orb_count(),
            network_stats: shared.endpoint.stats().clone(),
        }
    }

    pub fn client_infos(&self) -> Vec<ClientInfo> {
        let shared = self.shared.lock().unwrap();
        shared
            .peers
            .iter()
            .map(|(&player_id, peer)| {
                let rtt = shared
                    .world
                    .session(player_id)
                    .map(|s| s.last_rtt)
                    .unwrap_or(0.0);
                ClientInfo {
                    player_id,
                    name: peer.name.clone(),
                    addr: peer.addr.to_string(),
                    rtt_ms: (rtt * 1000.0) as u32,
                }
            })
            .collect()
    }
}

fn top_leaders(world: &ServerWorld, ids: &[i64]) -> Vec<String> {
    let mut ranked: Vec<(i64, f32, String)> = ids
        .iter()
        .filter_map(|&id| world.player(id).map(|p| (id, p.radius, p.name.clone())))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(5).map(|(_, _, name)| name).collect()
}

fn handle_datagram(shared: &mut Shared, payload: &[u8], addr: SocketAddr, now: f64) {
    if payload.len() < HEADER_LEN + 1 {
        return;
    }
    let mut cur = Cursor::new(payload);
    let header = match PacketHeader::read(&mut cur) {
        Ok(h) => h,
        Err(_) => return,
    };
    let code_byte = match cur.read_u8() {
        Ok(b) => b,
        Err(_) => return,
    };
    let Some(code) = MessageCode::from_u8(code_byte) else {
        return;
    };

    if let Some(&id) = shared.addr_to_id.get(&addr) {
        if let Some(peer) = shared.peers.get_mut(&id) {
            peer.recv_tracker.record_received(header.sequence);
        }
        shared.world.touch_session(id, now);
    }

    match code {
        MessageCode::Connect => {
            let Ok(name) = codec::decode_connect(&mut cur) else {
                return;
            };
            match shared.world.add_human_player(name.clone(), addr, now) {
                Ok(id) => {
                    let peer = PeerState {
                        addr,
                        send_seq: 0,
                        recv_tracker: ReceiveTracker::new(),
                        name: name.clone(),
                    };
                    shared.peers.insert(id, peer);
                    shared.addr_to_id.insert(addr, id);

                    let (fw, fh) = shared.world.field_size();
                    if let Some(player) = shared.world.player(id).cloned() {
                        let mut body = Vec::new();
                        codec::encode_connect_ack(&mut body, id, fw as u32, fh as u32, &player);
                        shared.send_framed(addr, MessageCode::Connect, &body);
                    }
                    shared.pending_events.push_back(ServerEvent::ClientConnected {
                        player_id: id,
                        addr,
                        name,
                    });
                }
                Err(GloopError::Rejected { reason }) => {
                    let mut body = Vec::new();
                    codec::encode_disconnect_notice(&mut body, &reason);
                    shared.send_framed(addr, MessageCode::Disconnect, &body);
                    shared.pending_events.push_back(ServerEvent::ConnectionDenied { addr, reason });
                }
                Err(_) => {}
            }
        }
        MessageCode::Inputs => {
            let Some(&id) = shared.addr_to_id.get(&addr) else {
                return;
            };
            if let Ok(inputs) = codec::decode_inputs(&mut cur) {
                shared.world.apply_inputs(id, inputs);
            }
        }
        MessageCode::Ack => {
            if let Ok(packet_id) = codec::decode_ack(&mut cur) {
                shared.outbox.ack(packet_id);
            }
        }
        MessageCode::Ping => {
            let Some(&id) = shared.addr_to_id.get(&addr) else {
                return;
            };
            if let Ok(prev_pulse) = codec::decode_ping(&mut cur) {
                let rtt = (now - prev_pulse).max(0.0);
                shared.world.set_rtt(id, rtt);
            }
        }
        MessageCode::Disconnect => {
            let Some(&id) = shared.addr_to_id.get(&addr) else {
                return;
            };
            shared.world.remove_player(id);
            shared.peers.remove(&id);
            shared.addr_to_id.remove(&addr);
            shared.pending_events.push_back(ServerEvent::ClientDisconnected {
                player_id: id,
                reason: DisconnectReason::Graceful,
            });
        }
        MessageCode::UpdPlayers | MessageCode::UpdOrbs | MessageCode::Death => {}
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub uptime_secs: u64,
    pub client_count: usize,
    pub player_limit: usize,
    pub player_count: usize,
    pub orb_count: usize,
    pub network_stats: NetworkStats,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub player_id: i64,
    pub name: String,
    pub addr: String,
    pub rtt_ms: u32,
}
