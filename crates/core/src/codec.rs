//! Wire format. Every datagram is `[PacketHeader][u8 code][code-specific body]`.
//!
//! Primitives are fixed-width little-endian integers/floats and
//! length-prefixed strings/lists, chosen so the format has no dependency on
//! any single language's serialization library.

use crate::constants::{MAX_NAME_LENGTH, PALETTE_SIZE};
use crate::entity::{Inputs, Orb, Player};
use crate::error::GloopError;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u16 = 1;

/// Encoded size of one `Orb` as written by [`encode_orb`]: `x, y, radius` (3
/// `f32`), `id` (`u32`), `color_idx` (`u8`).
pub const ORB_WIRE_SIZE: usize = 4 + 4 + 4 + 4 + 1;

/// How many orbs a single UPD_ORBS shard can carry (additions and removals
/// combined) without the datagram exceeding [`MAX_PACKET_SIZE`]. Callers that
/// emit more orbs than this in one diff must split across several packets,
/// each with its own `packet_id` so they ack/retransmit independently.
pub fn max_orbs_per_upd_orbs_shard() -> usize {
    // Frame header + code byte + packet_id + the two length-prefixed list
    // counts that `encode_upd_orbs` writes around the orb entries.
    let overhead = HEADER_LEN + 1 + 4 + 2 + 2;
    (MAX_PACKET_SIZE - overhead) / ORB_WIRE_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    Connect = 1,
    Inputs = 2,
    UpdPlayers = 3,
    UpdOrbs = 4,
    Ack = 5,
    Ping = 6,
    Death = 7,
    Disconnect = 8,
}

impl MessageCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Connect,
            2 => Self::Inputs,
            3 => Self::UpdPlayers,
            4 => Self::UpdOrbs,
            5 => Self::Ack,
            6 => Self::Ping,
            7 => Self::Death,
            8 => Self::Disconnect,
            _ => return None,
        })
    }

    /// Reliable codes are retransmitted by the sender until acknowledged.
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::UpdOrbs | Self::Death)
    }
}

/// Per-datagram framing: a selective-ack slot carried on every packet,
/// independent of whether the application payload itself needs
/// acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.ack.to_le_bytes());
        buf.extend_from_slice(&self.ack_bitfield.to_le_bytes());
    }

    pub fn read(cur: &mut Cursor) -> crate::error::Result<Self> {
        Ok(Self {
            sequence: cur.read_u32()?,
            ack: cur.read_u32()?,
            ack_bitfield: cur.read_u32()?,
        })
    }
}

pub const HEADER_LEN: usize = 12;

/// A read cursor over a received datagram.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> crate::error::Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(GloopError::MalformedFrame("truncated frame"));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> crate::error::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> crate::error::Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> crate::error::Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> crate::error::Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> crate::error::Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> crate::error::Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> crate::error::Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_string(&mut self) -> crate::error::Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| GloopError::MalformedFrame("name not utf8"))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_f32(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(u8::MAX as usize)];
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

pub fn encode_inputs(buf: &mut Vec<u8>, inputs: &Inputs) {
    write_i32(buf, inputs.x as i32);
    write_i32(buf, inputs.y as i32);
}

pub fn decode_inputs(cur: &mut Cursor) -> crate::error::Result<Inputs> {
    let x = cur.read_i32()? as f32;
    let y = cur.read_i32()? as f32;
    Ok(Inputs::new(x, y))
}

/// Encodes a player as `(name, id, field_width, field_height, x, y, color_idx, radius, inputs)`.
pub fn encode_player(buf: &mut Vec<u8>, p: &Player, field_width: u32, field_height: u32) {
    write_string(buf, &p.name);
    write_i64(buf, p.id);
    write_u32(buf, field_width);
    write_u32(buf, field_height);
    write_f32(buf, p.x);
    write_f32(buf, p.y);
    buf.push(p.color_idx);
    write_f32(buf, p.radius);
    encode_inputs(buf, &p.inputs);
}

/// Decodes a player, validating every field against its entity invariant.
/// Malformed frames are rejected rather than silently clamped.
pub fn decode_player(cur: &mut Cursor) -> crate::error::Result<Player> {
    let name = cur.read_string()?;
    if name.len() > MAX_NAME_LENGTH {
        return Err(GloopError::MalformedFrame("name too long"));
    }
    let id = cur.read_i64()?;
    let field_width = cur.read_u32()? as f32;
    let field_height = cur.read_u32()? as f32;
    if field_width <= 0.0 || field_height <= 0.0 {
        return Err(GloopError::MalformedFrame("non-positive field size"));
    }
    let x = cur.read_f32()?;
    let y = cur.read_f32()?;
    if !(0.0..field_width).contains(&x) || !(0.0..field_height).contains(&y) {
        return Err(GloopError::MalformedFrame("position out of field"));
    }
    let color_idx = cur.read_u8()?;
    if color_idx >= PALETTE_SIZE {
        return Err(GloopError::MalformedFrame("color index out of palette"));
    }
    let radius = cur.read_f32()?;
    if radius < crate::constants::START_RADIUS || radius > crate::constants::MAX_RADIUS {
        return Err(GloopError::MalformedFrame("radius out of range"));
    }
    let inputs = decode_inputs(cur)?;

    let mut player = Player::new(id, name, x, y, color_idx);
    player.radius = radius;
    player.inputs = inputs;
    player.recompute_scale();
    Ok(player)
}

pub fn encode_orb(buf: &mut Vec<u8>, orb: &Orb) {
    write_f32(buf, orb.x);
    write_f32(buf, orb.y);
    write_u32(buf, orb.id);
    write_f32(buf, orb.radius);
    buf.push(orb.color_idx);
}

pub fn decode_orb(cur: &mut Cursor) -> crate::error::Result<Orb> {
    let x = cur.read_f32()?;
    let y = cur.read_f32()?;
    let id = cur.read_u32()?;
    let radius = cur.read_f32()?;
    if radius < 0.0 {
        return Err(GloopError::MalformedFrame("negative orb radius"));
    }
    let color_idx = cur.read_u8()?;
    if color_idx >= PALETTE_SIZE {
        return Err(GloopError::MalformedFrame("color index out of palette"));
    }
    Ok(Orb::new(id, x, y, radius, color_idx))
}

pub fn write_list<T>(buf: &mut Vec<u8>, items: &[T], mut encode_one: impl FnMut(&mut Vec<u8>, &T)) {
    write_u16(buf, items.len() as u16);
    for item in items {
        encode_one(buf, item);
    }
}

pub fn read_list<T>(
    cur: &mut Cursor,
    mut decode_one: impl FnMut(&mut Cursor) -> crate::error::Result<T>,
) -> crate::error::Result<Vec<T>> {
    let count = cur.read_u16()? as usize;
    let mut out = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        out.push(decode_one(cur)?);
    }
    Ok(out)
}

// Application-level message bodies. Each pair of free functions encodes and
// decodes the payload that follows the `u8` message code on the wire; the
// code itself is written/read by the caller since it's shared framing, not
// part of any one message's body.

pub fn encode_connect(buf: &mut Vec<u8>, name: &str) {
    write_string(buf, name);
}

pub fn decode_connect(cur: &mut Cursor) -> crate::error::Result<String> {
    let name = cur.read_string()?;
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(GloopError::MalformedFrame("name length out of range"));
    }
    Ok(name)
}

pub fn encode_connect_ack(
    buf: &mut Vec<u8>,
    player_id: i64,
    field_width: u32,
    field_height: u32,
    player: &Player,
) {
    write_i64(buf, player_id);
    write_u32(buf, field_width);
    write_u32(buf, field_height);
    encode_player(buf, player, field_width, field_height);
}

pub fn decode_connect_ack(cur: &mut Cursor) -> crate::error::Result<(i64, u32, u32, Player)> {
    let player_id = cur.read_i64()?;
    let field_width = cur.read_u32()?;
    let field_height = cur.read_u32()?;
    let player = decode_player(cur)?;
    Ok((player_id, field_width, field_height, player))
}

pub fn encode_upd_players(
    buf: &mut Vec<u8>,
    server_time: f64,
    player_ping: f64,
    leaders: &[String],
    players: &[Player],
    field_width: u32,
    field_height: u32,
) {
    write_f64(buf, server_time);
    write_f64(buf, player_ping);
    write_list(buf, leaders, |b, s| write_string(b, s));
    write_list(buf, players, |b, p| encode_player(b, p, field_width, field_height));
}

#[allow(clippy::type_complexity)]
pub fn decode_upd_players(
    cur: &mut Cursor,
) -> crate::error::Result<(f64, f64, Vec<String>, Vec<Player>)> {
    let server_time = cur.read_f64()?;
    let player_ping = cur.read_f64()?;
    let leaders = read_list(cur, |c| c.read_string())?;
    let players = read_list(cur, decode_player)?;
    Ok((server_time, player_ping, leaders, players))
}

pub fn encode_upd_orbs(buf: &mut Vec<u8>, packet_id: u32, additions: &[Orb], removals: &[Orb]) {
    write_u32(buf, packet_id);
    write_list(buf, additions, |b, o| encode_orb(b, o));
    write_list(buf, removals, |b, o| encode_orb(b, o));
}

pub fn decode_upd_orbs(cur: &mut Cursor) -> crate::error::Result<(u32, Vec<Orb>, Vec<Orb>)> {
    let packet_id = cur.read_u32()?;
    let additions = read_list(cur, decode_orb)?;
    let removals = read_list(cur, decode_orb)?;
    Ok((packet_id, additions, removals))
}

pub fn encode_ack(buf: &mut Vec<u8>, packet_id: u32) {
    write_u32(buf, packet_id);
}

pub fn decode_ack(cur: &mut Cursor) -> crate::error::Result<u32> {
    cur.read_u32()
}

pub fn encode_ping(buf: &mut Vec<u8>, prev_server_pulse: f64) {
    write_f64(buf, prev_server_pulse);
}

pub fn decode_ping(cur: &mut Cursor) -> crate::error::Result<f64> {
    cur.read_f64()
}

pub fn encode_death(buf: &mut Vec<u8>, packet_id: u32, new_player_id: i64) {
    write_u32(buf, packet_id);
    write_i64(buf, new_player_id);
}

pub fn decode_death(cur: &mut Cursor) -> crate::error::Result<(u32, i64)> {
    let packet_id = cur.read_u32()?;
    let new_player_id = cur.read_i64()?;
    Ok((packet_id, new_player_id))
}

/// Client-to-server: "I'm leaving".
pub fn encode_disconnect_request(buf: &mut Vec<u8>, player_id: i64) {
    write_i64(buf, player_id);
}

pub fn decode_disconnect_request(cur: &mut Cursor) -> crate::error::Result<i64> {
    cur.read_i64()
}

/// Server-to-client: "you've been disconnected, here's why".
pub fn encode_disconnect_notice(buf: &mut Vec<u8>, reason: &str) {
    write_string(buf, reason);
}

pub fn decode_disconnect_notice(cur: &mut Cursor) -> crate::error::Result<String> {
    cur.read_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_round_trips() {
        let mut p = Player::new(7, "alice".into(), 100.25, 200.75, 3);
        p.radius = (50.0_f32 * 50.0 + 40.0 * 40.0).sqrt(); // post-eat radius, not a whole number
        p.inputs = Inputs::new(12.0, -5.0);

        let mut buf = Vec::new();
        encode_player(&mut buf, &p, 2560, 1440);
        let mut cur = Cursor::new(&buf);
        let decoded = decode_player(&mut cur).unwrap();

        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.name, "alice");
        assert_eq!(decoded.x, 100.25);
        assert_eq!(decoded.y, 200.75);
        assert_eq!(decoded.color_idx, 3);
        assert_eq!(decoded.radius, p.radius);
        assert_eq!(decoded.inputs, Inputs::new(12.0, -5.0));
    }

    #[test]
    fn rejects_radius_out_of_range() {
        let mut p = Player::new(1, "x".into(), 0.0, 0.0, 0);
        p.radius = 10.0; // below START_RADIUS
        let mut buf = Vec::new();
        encode_player(&mut buf, &p, 2560, 1440);
        let mut cur = Cursor::new(&buf);
        assert!(decode_player(&mut cur).is_err());
    }

    #[test]
    fn orb_round_trips() {
        let orb = Orb::new(42, 10.5, 20.25, 19.4, 5);
        let mut buf = Vec::new();
        encode_orb(&mut buf, &orb);
        let mut cur = Cursor::new(&buf);
        let decoded = decode_orb(&mut cur).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.x, 10.5);
        assert_eq!(decoded.y, 20.25);
        assert_eq!(decoded.radius, 19.4);
    }

    #[test]
    fn connect_round_trips() {
        let mut buf = Vec::new();
        encode_connect(&mut buf, "alice");
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_connect(&mut cur).unwrap(), "alice");
    }

    #[test]
    fn connect_rejects_empty_name() {
        let mut buf = Vec::new();
        encode_connect(&mut buf, "");
        let mut cur = Cursor::new(&buf);
        assert!(decode_connect(&mut cur).is_err());
    }

    #[test]
    fn connect_ack_round_trips() {
        let p = Player::new(9, "bob".into(), 50.0, 60.0, 2);
        let mut buf = Vec::new();
        encode_connect_ack(&mut buf, 9, 2560, 1440, &p);
        let mut cur = Cursor::new(&buf);
        let (player_id, field_width, field_height, player) = decode_connect_ack(&mut cur).unwrap();
        assert_eq!(player_id, 9);
        assert_eq!(field_width, 2560);
        assert_eq!(field_height, 1440);
        assert_eq!(player.id, 9);
        assert_eq!(player.name, "bob");
    }

    #[test]
    fn upd_players_round_trips() {
        let players = vec![
            Player::new(1, "a".into(), 10.0, 10.0, 0),
            Player::new(2, "b".into(), 20.0, 20.0, 1),
        ];
        let leaders = vec!["a".to_string(), "b".to_string()];
        let mut buf = Vec::new();
        encode_upd_players(&mut buf, 123.5, 0.042, &leaders, &players, 2560, 1440);
        let mut cur = Cursor::new(&buf);
        let (server_time, player_ping, decoded_leaders, decoded_players) =
            decode_upd_players(&mut cur).unwrap();
        assert_eq!(server_time, 123.5);
        assert_eq!(player_ping, 0.042);
        assert_eq!(decoded_leaders, leaders);
        assert_eq!(decoded_players.len(), 2);
        assert_eq!(decoded_players[1].id, 2);
    }

    #[test]
    fn upd_orbs_round_trips() {
        let additions = vec![Orb::new(1, 5.0, 5.0, 15.0, 0)];
        let removals = vec![Orb::new(2, 8.0, 8.0, 12.0, 1)];
        let mut buf = Vec::new();
        encode_upd_orbs(&mut buf, 77, &additions, &removals);
        let mut cur = Cursor::new(&buf);
        let (packet_id, decoded_add, decoded_rem) = decode_upd_orbs(&mut cur).unwrap();
        assert_eq!(packet_id, 77);
        assert_eq!(decoded_add[0].id, 1);
        assert_eq!(decoded_rem[0].id, 2);
    }

    #[test]
    fn upd_orbs_shard_capacity_keeps_a_full_shard_under_the_mtu() {
        let cap = max_orbs_per_upd_orbs_shard();
        assert!(cap > 0);

        let additions: Vec<_> = (0..cap as u32)
            .map(|i| Orb::new(i, 1.0, 2.0, 18.0, 0))
            .collect();
        let mut buf = Vec::new();
        encode_upd_orbs(&mut buf, 1, &additions, &[]);
        assert!(HEADER_LEN + 1 + buf.len() <= MAX_PACKET_SIZE);
    }

    #[test]
    fn ack_round_trips() {
        let mut buf = Vec::new();
        encode_ack(&mut buf, 4242);
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_ack(&mut cur).unwrap(), 4242);
    }

    #[test]
    fn ping_round_trips() {
        let mut buf = Vec::new();
        encode_ping(&mut buf, 98765.125);
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_ping(&mut cur).unwrap(), 98765.125);
    }

    #[test]
    fn death_round_trips() {
        let mut buf = Vec::new();
        encode_death(&mut buf, 11, -3);
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_death(&mut cur).unwrap(), (11, -3));
    }

    #[test]
    fn disconnect_request_round_trips() {
        let mut buf = Vec::new();
        encode_disconnect_request(&mut buf, 5);
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_disconnect_request(&mut cur).unwrap(), 5);
    }

    #[test]
    fn disconnect_notice_round_trips() {
        let mut buf = Vec::new();
        encode_disconnect_notice(&mut buf, "server full");
        let mut cur = Cursor::new(&buf);
        assert_eq!(decode_disconnect_notice(&mut cur).unwrap(), "server full");
    }
}
