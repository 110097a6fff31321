mod commands;
mod config;
mod handlers;
mod server;
mod session;
mod simulation;
mod transport;

#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use server::GameServer;
use wulf::ReadMode;

#[derive(Parser)]
#[command(name = "wulf-server")]
#[command(about = "Wulfram game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, default_value_t = wulf::DEFAULT_TCP_PORT)]
    tcp_port: u16,

    #[arg(long, default_value_t = wulf::DEFAULT_UDP_PORT)]
    udp_port: u16,

    #[arg(long, default_value = "127.0.0.1", help = "Address clients send UDP to")]
    server_ip: String,

    #[arg(short, long, default_value_t = wulf::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_sessions: usize,

    #[arg(long, default_value = "Welcome to Wulf-Forge")]
    motd: String,

    #[arg(long, default_value = "tron")]
    map: String,

    #[arg(long, default_value_t = 10, help = "Seconds between pings")]
    ping_interval: u64,

    #[arg(long, default_value_t = 5, help = "Seconds to wait for the UDP key echo")]
    key_wait: u64,

    #[arg(long, default_value_t = 6, help = "Unanswered pings before disconnect (0 = never)")]
    missed_pongs: u32,

    #[arg(long, help = "Read past the end of short packets as zeros")]
    lenient: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            tcp_port: self.tcp_port,
            udp_port: self.udp_port,
            server_ip: self.server_ip,
            tick_rate: self.tick_rate,
            ping_interval: Duration::from_secs(self.ping_interval.max(1)),
            key_wait: Duration::from_secs(self.key_wait),
            missed_pong_limit: self.missed_pongs,
            max_sessions: self.max_sessions,
            motd: self.motd,
            map_name: self.map,
            read_mode: if self.lenient {
                ReadMode::Lenient
            } else {
                ReadMode::Strict
            },
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = args.into_config();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let server = GameServer::bind(config).await?;
        let shared = server.shared();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Ctrl-C received");
                shared.shutdown();
            }
        });
        server.run().await
    })
}
