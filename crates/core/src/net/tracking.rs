//! Selective-ack bookkeeping for the per-datagram header, plus the
//! application-level reliable-message outbox (UPD_ORBS / DEATH) that
//! retransmits until acknowledged or timed out.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Tracks which datagram sequences we've seen from a peer, for the header's
/// `ack`/`ack_bitfield` slot and duplicate suppression.
#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: u32,
    received_bitfield: u32,
    recent: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: 0,
            received_bitfield: 0,
            recent: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }
        if self.recent.len() >= self.max_recent {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            self.received_bitfield = if diff <= 32 {
                (self.received_bitfield << diff) | 1
            } else {
                0
            };
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }
        true
    }

    pub fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitfield)
    }
}

/// A reliable application message (UPD_ORBS or DEATH) awaiting acknowledgement.
#[derive(Debug, Clone)]
struct PendingReliable {
    addr: SocketAddr,
    payload: Vec<u8>,
    sent_at: Instant,
}

/// Tracks in-flight reliable (at-least-once) messages keyed by `packet_id`.
/// A background pass calls `due_for_retransmit` every `ACK_INTERVAL` and
/// resends anything still pending; entries older than `TIMEOUT_LIMIT` are
/// reaped instead (the caller is expected to drop that peer).
///
/// This keeps retrying a packet until it is acknowledged or times out —
/// unlike a "send once and forget" scheduler, nothing here removes an entry
/// except an ACK or a timeout reap.
#[derive(Debug, Default)]
pub struct ReliableOutbox {
    pending: HashMap<u32, PendingReliable>,
}

impl ReliableOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, packet_id: u32, addr: SocketAddr, payload: Vec<u8>) {
        self.pending.insert(
            packet_id,
            PendingReliable {
                addr,
                payload,
                sent_at: Instant::now(),
            },
        );
    }

    pub fn ack(&mut self, packet_id: u32) {
        self.pending.remove(&packet_id);
    }

    /// Returns `(packet_id, addr, payload)` for everything still pending —
    /// the caller resends all of them, then calls `reap_timed_out`.
    pub fn all_pending(&self) -> Vec<(u32, SocketAddr, Vec<u8>)> {
        self.pending
            .iter()
            .map(|(id, p)| (*id, p.addr, p.payload.clone()))
            .collect()
    }

    /// Removes (and returns the ids of) entries older than `timeout`.
    pub fn reap_timed_out(&mut self, timeout: Duration) -> Vec<u32> {
        let now = Instant::now();
        let stale: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.sent_at) > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.pending.remove(id);
        }
        stale
    }

    pub fn remove_for_addr(&mut self, addr: &SocketAddr) {
        self.pending.retain(|_, p| p.addr != *addr);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Remembers recently-applied reliable `packet_id`s on the receive side so a
/// retransmitted packet is re-acknowledged but not re-applied.
#[derive(Debug, Default)]
pub struct ReliableInbox {
    seen: HashSet<u32>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl ReliableInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns true the first time `packet_id` is seen (caller should apply
    /// it); false on a repeat (caller should just re-ack).
    pub fn observe(&mut self, packet_id: u32) -> bool {
        if self.seen.contains(&packet_id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.seen.insert(packet_id);
        self.order.push_back(packet_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_tracker_bitfield() {
        let mut t = ReceiveTracker::new();
        t.record_received(1);
        t.record_received(2);
        t.record_received(3);
        let (ack, bitfield) = t.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield & 0b11, 0b11);
    }

    #[test]
    fn reliable_outbox_retries_until_acked() {
        let mut outbox = ReliableOutbox::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        outbox.track(1, addr, vec![1, 2, 3]);
        assert_eq!(outbox.all_pending().len(), 1);
        outbox.ack(1);
        assert_eq!(outbox.all_pending().len(), 0);
    }

    #[test]
    fn reliable_outbox_reaps_stale_entries() {
        let mut outbox = ReliableOutbox::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        outbox.track(1, addr, vec![]);
        let reaped = outbox.reap_timed_out(Duration::from_secs(0));
        assert_eq!(reaped, vec![1]);
        assert_eq!(outbox.pending_count(), 0);
    }

    #[test]
    fn reliable_inbox_applies_once() {
        let mut inbox = ReliableInbox::new(16);
        assert!(inbox.observe(5));
        assert!(!inbox.observe(5));
        assert!(inbox.observe(6));
    }
}
