use std::time::Duration;

use wulf::net::BehaviorConfig;
use wulf::{DEFAULT_TCP_PORT, DEFAULT_TICK_RATE, DEFAULT_UDP_PORT, ReadMode};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    /// Address clients are told to send UDP to.
    pub server_ip: String,
    pub tick_rate: u32,
    pub ping_interval: Duration,
    pub key_wait: Duration,
    /// Consecutive unanswered pings before the session is dropped; 0 never drops.
    pub missed_pong_limit: u32,
    pub max_sessions: usize,
    pub stale_endpoint_timeout: Duration,
    pub motd: String,
    pub map_name: String,
    pub read_mode: ReadMode,
    /// Rules and tuning sent to every client at login.
    pub behavior: BehaviorConfig,
    /// Shown as the donor flag on every login status.
    pub donor: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            server_ip: "127.0.0.1".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            ping_interval: Duration::from_secs(10),
            key_wait: Duration::from_secs(5),
            missed_pong_limit: 6,
            max_sessions: 32,
            stale_endpoint_timeout: Duration::from_secs(60),
            motd: "Welcome to Wulf-Forge".to_string(),
            map_name: "tron".to_string(),
            read_mode: ReadMode::Strict,
            behavior: BehaviorConfig::default(),
            donor: true,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn tcp_bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.tcp_port)
    }

    pub fn udp_bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.udp_port)
    }
}
