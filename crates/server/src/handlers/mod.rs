//! Per-transport packet handlers. A message that arrives on the wrong
//! transport never reaches the other table's handler.

mod tcp;
mod udp;

use wulf::net::packets::{self, CommMessage, RosterEntry};
use wulf::net::{PacketRegistry, TransportKind, opcode};
use wulf::SessionId;

use crate::server::Shared;
use crate::transport::TcpOutbox;

pub use tcp::{TcpContext, join_world_view};
pub use udp::{UdpContext, spawn_vehicle};

/// Client chatter that needs no server action.
const QUIET_OPCODES: [u8; 7] = [
    opcode::ACTION_DUMP,
    opcode::ACTION_UPDATE,
    opcode::PING_REQUEST,
    opcode::CLIENT_STATUS,
    opcode::BEHAVIOR,
    opcode::KEEP_ALIVE,
    opcode::LEGACY_UPDATE_ARRAY,
];

/// Both dispatch tables, built once at startup.
#[derive(Debug)]
pub struct Handlers {
    pub tcp: PacketRegistry<TcpContext>,
    pub udp: PacketRegistry<UdpContext>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self::new()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self {
            tcp: tcp_registry(),
            udp: udp_registry(),
        }
    }
}

fn tcp_registry() -> PacketRegistry<TcpContext> {
    PacketRegistry::builder(TransportKind::Tcp)
        .route(opcode::HELLO, tcp::on_hello)
        .route(opcode::LOGIN, tcp::on_login)
        .route(opcode::WANT_UPDATES, tcp::on_want_updates)
        .route(opcode::PING_REPLY, tcp::on_pong)
        .route(opcode::KUDOS, tcp::on_kudos)
        .route(opcode::BPS_REQUEST, tcp::on_bps_request)
        .quiet(&QUIET_OPCODES)
        .build()
}

fn udp_registry() -> PacketRegistry<UdpContext> {
    PacketRegistry::builder(TransportKind::Udp)
        .route(opcode::DEBUG_STRING, udp::on_debug_string)
        .route(opcode::ACK, udp::on_ack)
        .route(opcode::STREAM_HANDSHAKE, udp::on_stream_handshake)
        .route(opcode::UDP_PROBE, udp::on_probe)
        .route(opcode::PING_REQUEST, udp::on_client_ping)
        .route(opcode::PING_REPLY, udp::on_pong)
        .route(opcode::HELLO, udp::on_key_echo)
        .route(opcode::CHAT, udp::on_chat)
        .route(opcode::REINCARNATE, udp::on_reincarnate)
        .route(opcode::VIEWPOINT, udp::on_viewpoint)
        .route(opcode::BEACON, udp::on_beacon)
        .route(opcode::ACK2, udp::on_ack2)
        .route(opcode::KEEP_ALIVE, udp::on_keep_alive)
        .route(opcode::BPS_REQUEST, udp::on_bps_request)
        .quiet(&QUIET_OPCODES)
        .build()
}

/// How a logged-in session appears in other players' rosters.
pub fn roster_entry(shared: &Shared, id: SessionId) -> Option<RosterEntry> {
    let sessions = shared.sessions();
    let record = sessions.get(id)?;
    Some(RosterEntry {
        player_id: record.player_id()?,
        team: record.sim.team as i32,
        name: record.identity.name.clone(),
        nametag: String::new(),
    })
}

/// Queues `payload` on one TCP connection, logging failures.
pub fn send_tcp(outbox: &TcpOutbox, payload: &[u8]) {
    if let Err(e) = outbox.send(payload) {
        log::warn!("{}", e);
    }
}

pub fn send_system_tcp(outbox: &TcpOutbox, source_player: u32, text: &str) {
    send_tcp(
        outbox,
        &packets::comm_message(&CommMessage::system(source_player, text)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bps_routed_on_both_transports() {
        let handlers = Handlers::new();
        assert!(handlers.tcp.handles(opcode::BPS_REQUEST));
        assert!(handlers.udp.handles(opcode::BPS_REQUEST));
        assert!(!QUIET_OPCODES.contains(&opcode::BPS_REQUEST));
    }

    #[test]
    fn test_client_chatter_is_quiet_not_routed() {
        let handlers = Handlers::new();
        for op in [opcode::CLIENT_STATUS, opcode::LEGACY_UPDATE_ARRAY] {
            assert!(QUIET_OPCODES.contains(&op));
            assert!(!handlers.tcp.handles(op));
            assert!(!handlers.udp.handles(op));
        }
    }
}
