use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use gloop::codec::{self, Cursor, MessageCode, PacketHeader, HEADER_LEN, MAX_PACKET_SIZE};
use gloop::{
    ClientSession, GloopError, NetworkEndpoint, NetworkStats, Orb, OutgoingMessage, Player,
    ReceiveTracker, ReliableInbox, SessionEnd, Tracker,
};

use super::config::ClientConfig;

const MAX_CONNECT_ATTEMPTS: u32 = gloop::constants::CONNECTION_ATTEMPTS;
const CONNECT_RETRY_INTERVAL: f64 = gloop::constants::CONNECTION_ATTEMPT_INTERVAL;

/// Where this connection stands relative to the server. A plain enum rather
/// than bit flags since a connection only ever occupies one of these at a
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectState {
    Connecting,
    Connected,
    Denied(String),
    TimedOut,
}

/// Drives one UDP connection to a `gloop-server`: handshake retries, framing,
/// and handing decoded application messages to a [`ClientSession`] for
/// reconciliation. Single-threaded and cooperative — call `tick` once per
/// client frame.
pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    server_addr: SocketAddr,
    send_seq: u32,
    recv_tracker: ReceiveTracker,
    inbox: ReliableInbox,
    state: ConnectState,
    session: Option<ClientSession>,
    field_width: u32,
    field_height: u32,
    players: HashMap<i64, Player>,
    orbs: HashMap<u32, Orb>,
    server_tracker: Tracker,
    past_tracker: Tracker,
    name: String,
    attempts_sent: u32,
    last_attempt: f64,
    start_time: Instant,
}

impl NetworkClient {
    pub fn new(config: &ClientConfig, server_addr: SocketAddr) -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        Ok(Self {
            endpoint,
            server_addr,
            send_seq: 0,
            recv_tracker: ReceiveTracker::new(),
            inbox: ReliableInbox::new(gloop::constants::QUEUE_CAPACITY),
            state: ConnectState::Connecting,
            session: None,
            field_width: 0,
            field_height: 0,
            players: HashMap::new(),
            orbs: HashMap::new(),
            server_tracker: Tracker::default(),
            past_tracker: Tracker::default(),
            name: config.name.clone(),
            attempts_sent: 0,
            last_attempt: -CONNECT_RETRY_INTERVAL,
            start_time: Instant::now(),
        })
    }

    pub fn now(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn state(&self) -> &ConnectState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectState::Connected)
    }

    pub fn player_id(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.player_id())
    }

    pub fn players(&self) -> &HashMap<i64, Player> {
        &self.players
    }

    pub fn orbs(&self) -> &HashMap<u32, Orb> {
        &self.orbs
    }

    pub fn leaders(&self) -> &[String] {
        self.session.as_ref().map(|s| s.leaders()).unwrap_or(&[])
    }

    pub fn latency(&self) -> f64 {
        self.session.as_ref().map(|s| s.latency()).unwrap_or(0.0)
    }

    pub fn field_size(&self) -> (u32, u32) {
        (self.field_width, self.field_height)
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn server_tracker(&self) -> Tracker {
        self.server_tracker
    }

    pub fn past_tracker(&self) -> Tracker {
        self.past_tracker
    }

    /// Sets the local player's steering direction for the next `tick`. The
    /// session reads it straight off the player map when it assembles this
    /// tick's outgoing `Inputs` message.
    pub fn set_local_input(&mut self, inputs: gloop::Inputs) {
        if let Some(id) = self.player_id() {
            if let Some(player) = self.players.get_mut(&id) {
                player.inputs = inputs;
            }
        }
    }

    fn send_framed(&mut self, code: MessageCode, body: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 1 + body.len());
        let (ack, ack_bitfield) = self.recv_tracker.ack_data();
        PacketHeader::new(self.send_seq, ack, ack_bitfield).write(&mut buf);
        self.send_seq = self.send_seq.wrapping_add(1);
        buf.push(code as u8);
        buf.extend_from_slice(body);

        if buf.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "packet exceeds MTU"));
        }
        self.endpoint.send_to(&buf, self.server_addr, None)?;
        Ok(())
    }

    /// Advances the connection by one client frame: drains the socket,
    /// retries the handshake if still connecting, and once connected drives
    /// `ClientSession::sync` and sends whatever it asks for.
    pub fn tick(&mut self, dt: f32) -> io::Result<()> {
        let now = self.now();
        self.receive(now)?;

        match &self.state {
            ConnectState::Connecting => {
                if self.attempts_sent >= MAX_CONNECT_ATTEMPTS {
                    self.state = ConnectState::TimedOut;
                } else if now - self.last_attempt >= CONNECT_RETRY_INTERVAL {
                    self.send_connect()?;
                }
            }
            ConnectState::Connected => {
                let mut end_state = None;
                if let Some(session) = self.session.as_mut() {
                    let outgoing = session.sync(
                        now,
                        dt,
                        &mut self.players,
                        &mut self.orbs,
                        Some((&mut self.server_tracker, &mut self.past_tracker)),
                    );
                    for message in outgoing {
                        self.send_outgoing(message)?;
                    }
                    if !session.is_connected() {
                        end_state = Some(session.end_state().cloned());
                    }
                }
                if let Some(end_state) = end_state {
                    let reason = match end_state {
                        Some(SessionEnd::ServerInterrupted) => {
                            gloop::constants::NOT_CONNECTED_MESSAGE.to_string()
                        }
                        Some(SessionEnd::Disconnected(reason)) => reason,
                        None => String::new(),
                    };
                    self.state = ConnectState::Denied(reason);
                }
            }
            _ => {}
        }

        self.endpoint.flush_outbound()
    }

    /// Tells the server we're leaving. Best-effort: sent a few times back to
    /// back since there's no ack for it and the socket is about to close.
    pub fn send_disconnect(&mut self) -> io::Result<()> {
        let Some(player_id) = self.player_id() else {
            return Ok(());
        };
        let mut body = Vec::new();
        codec::encode_disconnect_request(&mut body, player_id);
        for _ in 0..3 {
            self.send_framed(MessageCode::Disconnect, &body)?;
        }
        self.endpoint.flush_outbound()
    }

    fn send_connect(&mut self) -> io::Result<()> {
        let mut body = Vec::new();
        codec::encode_connect(&mut body, &self.name);
        self.send_framed(MessageCode::Connect, &body)?;
        self.attempts_sent += 1;
        self.last_attempt = self.now();
        Ok(())
    }

    fn send_outgoing(&mut self, message: OutgoingMessage) -> io::Result<()> {
        let mut body = Vec::new();
        match message {
            OutgoingMessage::Inputs(inputs) => {
                codec::encode_inputs(&mut body, &inputs);
                self.send_framed(MessageCode::Inputs, &body)
            }
            OutgoingMessage::Ping(pulse) => {
                codec::encode_ping(&mut body, pulse);
                self.send_framed(MessageCode::Ping, &body)
            }
            OutgoingMessage::Ack(packet_id) => {
                codec::encode_ack(&mut body, packet_id);
                self.send_framed(MessageCode::Ack, &body)
            }
        }
    }

    fn receive(&mut self, now: f64) -> io::Result<()> {
        let datagrams = self.endpoint.receive(None)?;
        for (payload, addr) in datagrams {
            if addr != self.server_addr {
                continue;
            }
            if let Err(err) = self.handle_datagram(&payload, now) {
                log::warn!("dropping malformed datagram from server: {err}");
            }
        }
        Ok(())
    }

    fn handle_datagram(&mut self, payload: &[u8], now: f64) -> gloop::Result<()> {
        let mut cur = Cursor::new(payload);
        let header = PacketHeader::read(&mut cur)?;
        self.recv_tracker.record_received(header.sequence);
        let code_byte = cur.read_u8()?;
        let code = MessageCode::from_u8(code_byte)
            .ok_or(GloopError::MalformedFrame("unknown message code"))?;

        match code {
            // The server replies to our Connect with a Connect-ack body under
            // the same code; there's no separate ack code in the table.
            MessageCode::Connect => {
                let (player_id, field_width, field_height, player) =
                    codec::decode_connect_ack(&mut cur)?;
                self.field_width = field_width;
                self.field_height = field_height;
                self.players.insert(player_id, player.clone());
                self.session = Some(ClientSession::new(player_id, player, now));
                self.state = ConnectState::Connected;
            }
            MessageCode::UpdPlayers => {
                let (server_pulse, player_ping, leaders, players) =
                    codec::decode_upd_players(&mut cur)?;
                if let Some(session) = self.session.as_mut() {
                    session.ingest_player_update(now, player_ping, server_pulse, leaders, players);
                }
            }
            MessageCode::UpdOrbs => {
                let (packet_id, additions, removals) = codec::decode_upd_orbs(&mut cur)?;
                let fresh = self.inbox.observe(packet_id);
                if let Some(session) = self.session.as_mut() {
                    if fresh {
                        session.ingest_orb_update(now, packet_id, additions, removals);
                    } else {
                        session.ingest_orb_update(now, packet_id, Vec::new(), Vec::new());
                    }
                }
            }
            MessageCode::Death => {
                let (packet_id, new_player_id) = codec::decode_death(&mut cur)?;
                if let Some(session) = self.session.as_mut() {
                    session.ingest_death(now, packet_id, new_player_id);
                }
            }
            MessageCode::Disconnect => {
                let reason = codec::decode_disconnect_notice(&mut cur)?;
                match (&self.state, self.session.as_mut()) {
                    (ConnectState::Connecting, _) => {
                        self.state = ConnectState::Denied(reason);
                    }
                    (_, Some(session)) => session.ingest_disconnect(reason),
                    _ => {}
                }
            }
            MessageCode::Inputs | MessageCode::Ack | MessageCode::Ping => {
                // Client-outbound-only codes; nothing to do if the server
                // somehow echoes one back.
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting() {
        let config = ClientConfig::default();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let client = NetworkClient::new(&config, addr).unwrap();
        assert_eq!(*client.state(), ConnectState::Connecting);
        assert!(!client.is_connected());
    }
}
