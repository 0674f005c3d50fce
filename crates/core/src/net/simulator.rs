//! Delay queues used to simulate artificial latency on top of a real socket.
//! A datagram that would otherwise be sent/received immediately is instead
//! released once its scheduled time arrives.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::stats::PacketLossSimulation;

#[derive(Debug)]
struct Delayed {
    release_at: Instant,
    payload: Vec<u8>,
    addr: SocketAddr,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at
    }
}
impl Eq for Delayed {}
impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other.release_at.cmp(&self.release_at) // min-heap by release time
    }
}

#[derive(Debug, Default)]
pub struct DelayQueue {
    queue: BinaryHeap<Delayed>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: Vec<u8>, addr: SocketAddr, delay: Duration) {
        self.queue.push(Delayed {
            release_at: Instant::now() + delay,
            payload,
            addr,
        });
    }

    /// Drains every entry whose release time has arrived.
    pub fn drain_ready(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        let mut out = Vec::new();
        let now = Instant::now();
        while let Some(top) = self.queue.peek() {
            if top.release_at <= now {
                let item = self.queue.pop().unwrap();
                out.push((item.payload, item.addr));
            } else {
                break;
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Computes the delay (possibly zero) a datagram to/from `sim` should incur,
/// and whether it should be dropped outright.
pub fn roll(sim: &PacketLossSimulation) -> Option<Duration> {
    if sim.should_drop() {
        return None;
    }
    Some(Duration::from_millis(sim.delay_ms() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_item_not_ready_immediately() {
        let mut q = DelayQueue::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        q.push(vec![1], addr, Duration::from_millis(50));
        assert!(q.drain_ready().is_empty());
    }

    #[test]
    fn zero_delay_is_ready_immediately() {
        let mut q = DelayQueue::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        q.push(vec![1], addr, Duration::ZERO);
        assert_eq!(q.drain_ready().len(), 1);
    }
}
