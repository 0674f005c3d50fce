//! Degraded-network simulation and bandwidth/latency bookkeeping.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub packet_loss_percent: f32,
}

impl NetworkStats {
    pub fn record_send(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_receive(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn record_drop(&mut self) {
        self.packets_dropped += 1;
        if self.packets_sent > 0 {
            self.packet_loss_percent =
                (self.packets_dropped as f32 / self.packets_sent as f32) * 100.0;
        }
    }
}

/// Artificial loss/latency/jitter applied to a peer, the way the demo
/// binaries let you dial in "what does a bad connection feel like".
#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
    /// Seconds, out of every `LAG_SPIKE_INTERVAL`-second period, during which
    /// every send/receive through the affected endpoint fails outright.
    pub lag_spike_duration: f64,
}

impl PacketLossSimulation {
    pub fn should_drop(&self) -> bool {
        if !self.enabled {
            return false;
        }
        if self.lag_spike_duration > 0.0 && Self::in_lag_spike(now_secs(), self.lag_spike_duration) {
            return true;
        }
        if self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }

    pub fn delay_ms(&self) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let mut rng = rand::thread_rng();
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        base + if range > 0 { rng.gen_range(0..=range) } else { 0 } + jitter
    }

    /// True while inside a synthetic lag spike window: every send/receive for
    /// the affected peer fails outright for `lag_spike_duration` seconds out
    /// of every `LAG_SPIKE_INTERVAL`-second period.
    pub fn in_lag_spike(now_secs: u64, lag_spike_duration: f64) -> bool {
        (now_secs % crate::constants::LAG_SPIKE_INTERVAL) < lag_spike_duration as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_drops() {
        let sim = PacketLossSimulation::default();
        for _ in 0..100 {
            assert!(!sim.should_drop());
        }
    }

    #[test]
    fn full_loss_always_drops() {
        let sim = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        assert!(sim.should_drop());
    }

    #[test]
    fn lag_spike_window_is_a_prefix_of_each_interval() {
        assert!(PacketLossSimulation::in_lag_spike(0, 2.0));
        assert!(PacketLossSimulation::in_lag_spike(1, 2.0));
        assert!(!PacketLossSimulation::in_lag_spike(2, 2.0));
        assert!(PacketLossSimulation::in_lag_spike(10, 2.0));
        assert!(!PacketLossSimulation::in_lag_spike(9, 2.0));
    }

    #[test]
    fn enabled_sim_with_full_spike_duration_always_drops_even_at_zero_loss_percent() {
        let sim = PacketLossSimulation {
            enabled: true,
            lag_spike_duration: crate::constants::LAG_SPIKE_INTERVAL as f64,
            ..Default::default()
        };
        for _ in 0..20 {
            assert!(sim.should_drop());
        }
    }
}
