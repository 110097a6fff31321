//! Human-readable packet names and hex dumps for trace logging.

use std::fmt::Write;
use std::net::SocketAddr;

use super::protocol::opcode;

pub fn packet_name(op: u8) -> &'static str {
    match op {
        opcode::DEBUG_STRING => "DEBUG_STRING",
        opcode::ACK => "D_ACK",
        opcode::STREAM_HANDSHAKE => "D_HANDSHAKE",
        opcode::STREAM_SET_START => "D_SET_START",
        opcode::UDP_PROBE => "HELLO_ACK",
        opcode::ACTION_DUMP => "ACTION_DUMP",
        opcode::ACTION_UPDATE => "ACTION_UPDATE",
        opcode::PING_REQUEST => "PING_REQUEST",
        opcode::PING_REPLY => "PING_REPLY",
        opcode::UPDATE_ARRAY => "UPDATE_ARRAY",
        opcode::VIEW_UPDATE => "VIEW_UPDATE",
        opcode::HELLO => "HELLO",
        opcode::WORLD_STATS => "WORLD_STATS",
        opcode::PLAYER_INFO => "PLAYER_INFO",
        opcode::ENTITY_SPAWN => "TANK",
        opcode::ENTITY_REMOVE => "DELETE_ENTITY",
        opcode::ADD_TO_ROSTER => "ADD_TO_ROSTER",
        opcode::UPDATE_STATS => "UPDATE_STATS",
        opcode::DEATH_NOTICE => "DEATH_NOTICE",
        opcode::COMM_MESSAGE => "COMM_MESSAGE",
        opcode::CHAT => "COMM_REQ",
        opcode::LOGIN => "LOGIN_REQ",
        opcode::LOGIN_STATUS => "LOGIN_STATUS",
        opcode::MOTD => "MOTD",
        opcode::BEHAVIOR => "BEHAVIOR",
        opcode::REINCARNATE => "REINCARNATE",
        opcode::TEAM_INFO => "TEAM_INFO",
        opcode::GAME_CLOCK => "GAME_CLOCK",
        opcode::TRANSLATION => "TRANSLATION",
        opcode::ACK2 => "ACK2",
        opcode::VIEWPOINT => "VIEWPOINT_INFO",
        opcode::WANT_UPDATES => "WANT_UPDATES",
        opcode::BEACON => "BEACON_REQ",
        opcode::RESET_GAME => "RESET_GAME",
        opcode::KEEP_ALIVE => "KEEP_ALIVE",
        opcode::ROUTING_PING => "ROUTING_PING",
        opcode::CLIENT_STATUS => "CLIENT_STATUS",
        opcode::LEGACY_UPDATE_ARRAY => "LEGACY_UPDATE_ARRAY",
        opcode::IDENTIFIED_UDP => "ID_UDP",
        opcode::BPS_REQUEST => "BPS_REQUEST",
        opcode::KUDOS => "KUDOS",
        _ => "UNKNOWN",
    }
}

/// Space separated hex with an ASCII gutter every 16 bytes.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (i, chunk) in data.chunks(16).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "  {:04X}: ", i * 16);
        for b in chunk {
            let _ = write!(out, "{:02X} ", b);
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push('|');
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('|');
    }
    out
}

/// Logs a payload at trace level; formatting is skipped when disabled.
pub fn log_packet(direction: &str, payload: &[u8], addr: Option<SocketAddr>) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    let Some(&op) = payload.first() else {
        return;
    };
    let addr = addr.map(|a| format!(" | {}", a)).unwrap_or_default();
    log::trace!(
        "[{}] 0x{:02X} {} len={}{}\n{}",
        direction,
        op,
        packet_name(op),
        payload.len(),
        addr,
        hex_dump(payload)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_names() {
        assert_eq!(packet_name(0x13), "HELLO");
        assert_eq!(packet_name(0x4D), "ID_UDP");
        assert_eq!(packet_name(opcode::CLIENT_STATUS), "CLIENT_STATUS");
        assert_eq!(packet_name(0x49), "LEGACY_UPDATE_ARRAY");
        assert_eq!(packet_name(0xEE), "UNKNOWN");
    }

    #[test]
    fn test_hex_dump() {
        let dump = hex_dump(&[0x13, 0x02, b'K', b'y']);
        assert!(dump.starts_with("  0000: 13 02 4B 79 "));
        assert!(dump.ends_with("|..Ky|"));
        assert_eq!(hex_dump(&[0u8; 17]).lines().count(), 2);
    }
}
