//! Thin non-blocking UDP wrapper. Speaks raw byte datagrams; framing and
//! codes live in [`crate::codec`]. Degraded-network simulation (drop/delay)
//! is layered on top via [`super::simulator::DelayQueue`].

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::simulator::{self, DelayQueue};
use super::stats::{NetworkStats, PacketLossSimulation};
use crate::codec::MAX_PACKET_SIZE;

pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    stats: NetworkStats,
    outbound_delay: DelayQueue,
    inbound_delay: DelayQueue,
    last_receive_time: Instant,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            stats: NetworkStats::default(),
            outbound_delay: DelayQueue::new(),
            inbound_delay: DelayQueue::new(),
            last_receive_time: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Sends a datagram immediately, applying loss/delay simulation if
    /// provided. Returns `Ok(false)` if the packet was simulated-dropped.
    pub fn send_to(
        &mut self,
        payload: &[u8],
        addr: SocketAddr,
        sim: Option<&PacketLossSimulation>,
    ) -> io::Result<bool> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "packet exceeds MTU"));
        }

        if let Some(sim) = sim {
            match simulator::roll(sim) {
                None => {
                    self.stats.record_drop();
                    return Ok(false);
                }
                Some(delay) if !delay.is_zero() => {
                    self.outbound_delay.push(payload.to_vec(), addr, delay);
                    return Ok(true);
                }
                _ => {}
            }
        }

        let bytes = self.socket.send_to(payload, addr)?;
        self.stats.record_send(bytes);
        Ok(true)
    }

    /// Flushes any outbound datagrams whose artificial delay has elapsed.
    pub fn flush_outbound(&mut self) -> io::Result<()> {
        for (payload, addr) in self.outbound_delay.drain_ready() {
            let bytes = self.socket.send_to(&payload, addr)?;
            self.stats.record_send(bytes);
        }
        Ok(())
    }

    /// Drains the socket, optionally routing packets through an inbound delay
    /// queue so "arrival" is delayed the same way "send" is. Returns
    /// datagrams whose delay (if any) has already elapsed.
    pub fn receive(&mut self, sim: Option<&PacketLossSimulation>) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.record_receive(size);
                    self.last_receive_time = Instant::now();
                    let payload = self.recv_buffer[..size].to_vec();

                    if let Some(sim) = sim {
                        match simulator::roll(sim) {
                            None => {
                                self.stats.record_drop();
                                continue;
                            }
                            Some(delay) if !delay.is_zero() => {
                                self.inbound_delay.push(payload, addr, delay);
                                continue;
                            }
                            _ => {}
                        }
                    }

                    self.inbound_delay.push(payload, addr, Duration::ZERO);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(self.inbound_delay.drain_ready())
    }

    pub fn is_idle_for(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trip() {
        let mut a = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let mut b = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let b_addr = b.local_addr();

        a.send_to(b"hello", b_addr, None).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let received = b.receive(None).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, b"hello");
    }
}
