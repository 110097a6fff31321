use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_failures: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pub missed_pongs: u32,
    pub last_receive: Instant,
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            send_failures: 0,
            rtt_ms: 100.0,
            rtt_variance: 50.0,
            missed_pongs: 0,
            last_receive: Instant::now(),
        }
    }
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_send_failure(&mut self) {
        self.send_failures += 1;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
        self.last_receive = Instant::now();
    }

    /// A ping went out; counts as missed until the matching pong arrives.
    pub fn record_ping(&mut self) {
        self.missed_pongs += 1;
    }

    pub fn record_pong(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        self.missed_pongs = 0;
        let diff = (rtt_ms - self.rtt_ms).abs();
        self.rtt_variance = (1.0 - BETA) * self.rtt_variance + BETA * diff;
        self.rtt_ms = (1.0 - ALPHA) * self.rtt_ms + ALPHA * rtt_ms;
    }
}

/// Non-cryptographic random value. Each call draws a fresh `RandomState`
/// so back-to-back calls differ even within one clock tick.
pub fn rand_u64() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    hasher.write_u64(nanos);
    hasher.finish()
}
