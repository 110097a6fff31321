//! Builders for server-to-client messages. Every builder returns a complete
//! payload, opcode first, ready for either transport.

use glam::Vec3;

use super::behavior::BehaviorConfig;
use super::bitstream::BitWriter;
use super::protocol::{HelloSubCommand, opcode};
use super::quantize::{MaxPrecision, SLOT_ENERGY, SLOT_HEALTH, SLOT_WEAPON, TranslationTable};

fn writer(op: u8) -> BitWriter {
    let mut w = BitWriter::with_capacity(32);
    w.write_u8(op);
    w
}

pub fn hello_udp_config(udp_port: u16, server_ip: &str) -> Vec<u8> {
    let mut w = writer(opcode::HELLO);
    w.write_u8(HelloSubCommand::UdpConfig as u8);
    w.write_u16(udp_port);
    w.write_u16(1);
    w.write_string(server_ip);
    w.into_bytes()
}

pub fn hello_session_key(key: &str) -> Vec<u8> {
    let mut w = writer(opcode::HELLO);
    w.write_u8(HelloSubCommand::SessionKey as u8);
    w.write_string(key);
    w.into_bytes()
}

pub fn hello_verified() -> Vec<u8> {
    vec![opcode::HELLO, HelloSubCommand::Verified as u8]
}

pub fn identified_udp() -> Vec<u8> {
    vec![opcode::IDENTIFIED_UDP]
}

pub fn login_status(code: u8, is_donor: bool) -> Vec<u8> {
    vec![opcode::LOGIN_STATUS, is_donor as u8, code]
}

/// Answers a send-rate request by confirming the rate.
pub fn bps_reply(rate: u32) -> Vec<u8> {
    let mut w = writer(opcode::BPS_REQUEST);
    w.write_u32(rate);
    w.into_bytes()
}

pub fn behavior(config: &BehaviorConfig) -> Vec<u8> {
    let mut w = BitWriter::with_capacity(3300);
    w.write_u8(opcode::BEHAVIOR);
    config.write(&mut w);
    w.into_bytes()
}

pub fn player_info(player_id: u32, is_guest: bool) -> Vec<u8> {
    let mut w = writer(opcode::PLAYER_INFO);
    w.write_u32(player_id);
    w.write_u8(is_guest as u8);
    w.into_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDescription {
    pub id: u8,
    pub name: String,
    pub short_name: String,
    pub base_name: String,
    pub description: String,
    pub victory_text: String,
}

pub fn default_teams() -> Vec<TeamDescription> {
    vec![
        TeamDescription {
            id: 1,
            name: "Crimson Federation".into(),
            short_name: "Red Team".into(),
            base_name: "Crimson Base".into(),
            description: "The red team.".into(),
            victory_text: "Azure Alliance Wins!".into(),
        },
        TeamDescription {
            id: 2,
            name: "Azure Alliance".into(),
            short_name: "Blue Team".into(),
            base_name: "Crimson Base".into(),
            description: "The blue team.".into(),
            victory_text: "Crimson Federation Wins!".into(),
        },
    ]
}

pub fn team_info(teams: &[TeamDescription]) -> Vec<u8> {
    let mut w = writer(opcode::TEAM_INFO);
    for team in teams {
        w.write_u8(team.id);
        w.write_string(&team.name);
        w.write_string(&team.short_name);
        w.write_string(&team.base_name);
        w.write_string(&team.description);
        w.write_string(&team.victory_text);
    }
    w.into_bytes()
}

pub fn game_clock(ticks: u32) -> Vec<u8> {
    let mut w = writer(opcode::GAME_CLOCK);
    w.write_u32(ticks);
    w.write_u8(1);
    w.write_i32(1);
    w.write_i32(30000);
    w.into_bytes()
}

pub fn motd(text: &str) -> Vec<u8> {
    let mut w = writer(opcode::MOTD);
    w.write_string(text);
    w.into_bytes()
}

/// Announces every quantization slot so the client decodes exactly what
/// the encoder writes.
pub fn translation(table: &TranslationTable) -> Vec<u8> {
    let mut w = writer(opcode::TRANSLATION);
    for profile in table.slots() {
        w.write_i32(profile.precision_header_bits as i32);
        w.write_i32(0);
        w.write_i32(profile.max_total_bits);
        w.write_string(&format!("{:?}", profile.max_value));
        w.write_string(&format!("{:?}", profile.range));
    }
    w.into_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub player_id: u32,
    pub team: i32,
    pub name: String,
    pub nametag: String,
}

pub fn add_to_roster(entry: &RosterEntry) -> Vec<u8> {
    let mut w = writer(opcode::ADD_TO_ROSTER);
    w.write_u32(entry.player_id);
    w.write_i32(entry.team);
    w.write_i16(0);
    w.write_i16(0);
    w.write_string(&entry.name);
    w.write_string(&entry.nametag);
    w.write_i16(0);
    w.write_i16(0);
    w.write_fixed(0.0);
    w.write_i32(0);
    w.into_bytes()
}

pub fn world_stats(map_name: &str) -> Vec<u8> {
    let mut w = writer(opcode::WORLD_STATS);
    w.write_string(map_name);
    w.write_u8(1);
    w.write_u8(1);
    w.write_fixed(1.0);
    w.into_bytes()
}

/// Chat scopes and message classes understood by the client.
pub mod comm {
    pub const KIND_SYSTEM: i16 = 0;
    pub const KIND_CHAT: i16 = 5;
    pub const SCOPE_GLOBAL: i16 = 0;
    pub const SCOPE_COMMAND: i16 = 1;
    pub const SCOPE_TEAM: i16 = 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommMessage {
    pub kind: i16,
    pub source_player: u32,
    pub scope: i16,
    pub recipient: i32,
    pub text: String,
}

impl CommMessage {
    pub fn system(source_player: u32, text: impl Into<String>) -> Self {
        Self {
            kind: comm::KIND_SYSTEM,
            source_player,
            scope: comm::SCOPE_GLOBAL,
            recipient: 0,
            text: text.into(),
        }
    }
}

pub fn comm_message(msg: &CommMessage) -> Vec<u8> {
    let mut w = writer(opcode::COMM_MESSAGE);
    w.write_i16(msg.kind);
    w.write_u32(msg.source_player);
    w.write_i16(msg.scope);
    w.write_i32(msg.recipient);
    w.write_string(&msg.text);
    w.into_bytes()
}

pub fn update_stats(player_id: u32, team: i16) -> Vec<u8> {
    let mut w = writer(opcode::UPDATE_STATS);
    w.write_u32(player_id);
    w.write_i32(6);
    w.write_i16(team);
    w.write_i16(33);
    w.write_i16(3);
    w.write_i16(5);
    w.write_i16(9);
    w.write_fixed(1.0);
    w.write_fixed(1.0);
    w.write_i32(10);
    w.into_bytes()
}

pub fn reincarnate_status(code: u8, message: &str) -> Vec<u8> {
    let mut w = writer(opcode::REINCARNATE);
    w.write_u8(code);
    w.write_string(message);
    w.into_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankVitals {
    pub weapon_id: u8,
    pub health: f32,
    pub energy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankSpawn {
    pub ticks: u32,
    pub unit_type: i32,
    pub net_id: u32,
    pub flags: u8,
    pub position: Vec3,
    pub velocity: Vec3,
    pub vitals: Option<TankVitals>,
}

/// Places the receiving player's own vehicle in the world.
pub fn entity_spawn(spawn: &TankSpawn, table: &TranslationTable) -> Vec<u8> {
    let mut w = writer(opcode::ENTITY_SPAWN);
    w.write_u32(spawn.ticks);
    w.write_bool(spawn.vitals.is_some());
    if let Some(vitals) = spawn.vitals {
        w.write_bits(vitals.weapon_id as u64, table.field_bits(SLOT_WEAPON));
        table
            .get(SLOT_HEALTH)
            .write_scalar(&mut w, vitals.health, &MaxPrecision);
        table
            .get(SLOT_ENERGY)
            .write_scalar(&mut w, vitals.energy, &MaxPrecision);
    }
    w.write_i32(spawn.unit_type);
    w.write_u32(spawn.net_id);
    w.write_u8(spawn.flags);
    w.write_vec3_fixed(spawn.position);
    w.write_vec3_fixed(spawn.velocity);
    w.into_bytes()
}

pub fn entity_remove(net_id: u32) -> Vec<u8> {
    let mut w = writer(opcode::ENTITY_REMOVE);
    w.write_u32(net_id);
    w.into_bytes()
}

pub fn death_notice(player_id: u32) -> Vec<u8> {
    let mut w = writer(opcode::DEATH_NOTICE);
    w.write_u32(player_id);
    w.into_bytes()
}

pub fn reset_game() -> Vec<u8> {
    vec![opcode::RESET_GAME]
}

pub fn ping_request(ticks: u32) -> Vec<u8> {
    let mut w = writer(opcode::PING_REQUEST);
    w.write_u32(ticks);
    w.into_bytes()
}

pub fn ping_reply(echo: i32) -> Vec<u8> {
    let mut w = writer(opcode::PING_REPLY);
    w.write_i32(echo);
    w.into_bytes()
}

/// Sub-command 0 of the ACK opcode, answering a stream handshake.
pub fn handshake_ack(ticks: u32) -> Vec<u8> {
    let mut w = writer(opcode::ACK);
    w.write_u8(0);
    w.write_u32(ticks);
    w.into_bytes()
}

pub const STREAM_NAMES: [&str; 4] = ["Unreliable", "Reliable", "Stream 2", "Game Data"];
pub const RELIABLE_STREAM: u8 = 1;
pub const GAME_DATA_STREAM: u8 = 3;

pub fn stream_definitions(ticks: u32, player_id: u32) -> Vec<u8> {
    let mut w = writer(opcode::STREAM_HANDSHAKE);
    w.write_u32(ticks);
    w.write_u32(player_id);

    w.write_i32(STREAM_NAMES.len() as i32);
    for (id, name) in STREAM_NAMES.iter().enumerate() {
        w.write_string(name);
        w.write_i32(1);
        w.write_i32(id as i32);
    }

    w.write_i32(STREAM_NAMES.len() as i32);
    for id in 0..STREAM_NAMES.len() {
        w.write_i32(id as i32);
        w.write_i32(1);
    }
    w.into_bytes()
}

pub fn stream_set_start(stream: u8, seq: u16) -> Vec<u8> {
    let mut w = writer(opcode::STREAM_SET_START);
    w.write_u8(stream);
    w.write_u16(seq);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::bitstream::BitReader;
    use crate::net::quantize::TRANSLATION_SLOTS;

    #[test]
    fn test_hello_udp_config() {
        let payload = hello_udp_config(2627, "127.0.0.1");
        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::HELLO);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u16().unwrap(), 2627);
        assert_eq!(r.read_u16().unwrap(), 1);
        assert_eq!(r.read_string().unwrap(), "127.0.0.1");
        assert!(r.is_at_end());
    }

    #[test]
    fn test_fixed_layouts() {
        assert_eq!(hello_verified(), vec![0x13, 0x03]);
        assert_eq!(identified_udp(), vec![0x4D]);
        assert_eq!(login_status(8, true), vec![0x22, 0x01, 0x08]);
        assert_eq!(player_info(7, false), vec![0x17, 0, 0, 0, 7, 0]);
        assert_eq!(stream_set_start(3, 1), vec![0x04, 0x03, 0x00, 0x01]);
        assert_eq!(reset_game(), vec![0x3F]);
    }

    #[test]
    fn test_bps_reply_echoes_rate() {
        assert_eq!(bps_reply(15_000), vec![0x4E, 0x00, 0x00, 0x3A, 0x98]);
    }

    #[test]
    fn test_behavior_layout() {
        let payload = behavior(&BehaviorConfig::default());
        // header, weapon slots, units, vehicle physics, hardpoints, handling
        let body = 95 + 4 * 13 * 45 + 39 * 12 + 2 * 36 + 144 + 27 * 4;
        assert_eq!(payload.len(), 1 + body);

        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::BEHAVIOR);
        assert_eq!(r.read_u8().unwrap(), 0);
        assert_eq!(r.read_fixed().unwrap(), 5.0);
        for _ in 0..4 {
            assert_eq!(r.read_fixed().unwrap(), 100.0);
        }
        assert_eq!(r.read_i32().unwrap(), 20);
        assert_eq!(r.read_i32().unwrap(), 25_000);
        assert_eq!(r.read_i32().unwrap(), 35_000);

        // The final value is the bomber's low fuel level.
        let mut tail = BitReader::new(&payload[payload.len() - 4..]);
        assert_eq!(tail.read_fixed().unwrap(), 2000.0);
    }

    #[test]
    fn test_behavior_follows_configured_counts() {
        let mut config = BehaviorConfig::default();
        let full = behavior(&config).len();
        config.unit_count = 1;
        config.weapon_units = 0;
        assert_eq!(behavior(&config).len(), full - 38 * 12 - 4 * 13 * 45);
    }

    #[test]
    fn test_translation_entries() {
        let table = TranslationTable::default();
        let payload = translation(&table);
        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::TRANSLATION);

        let mut entries = Vec::new();
        for _ in 0..TRANSLATION_SLOTS {
            let header = r.read_i32().unwrap();
            assert_eq!(r.read_i32().unwrap(), 0);
            let total = r.read_i32().unwrap();
            let max = r.read_string().unwrap();
            let range = r.read_string().unwrap();
            entries.push((header, total, max, range));
        }
        assert!(r.is_at_end());

        assert_eq!(entries[0], (16, 0, "1000.0".to_string(), "2000.0".to_string()));
        assert_eq!(entries[5], (10, 0, "1.0".to_string(), "1.0".to_string()));
        assert_eq!(entries[16], (4, 16, "8192.0".to_string(), "16384.0".to_string()));
        assert_eq!(entries[26], (4, 16, "6.3".to_string(), "12.6".to_string()));
    }

    #[test]
    fn test_comm_message() {
        let payload = comm_message(&CommMessage::system(1001, "You died."));
        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::COMM_MESSAGE);
        assert_eq!(r.read_i16().unwrap(), comm::KIND_SYSTEM);
        assert_eq!(r.read_u32().unwrap(), 1001);
        assert_eq!(r.read_i16().unwrap(), comm::SCOPE_GLOBAL);
        assert_eq!(r.read_i32().unwrap(), 0);
        assert_eq!(r.read_string().unwrap(), "You died.");
    }

    #[test]
    fn test_roster_entry() {
        let entry = RosterEntry {
            player_id: 1001,
            team: 2,
            name: "pilot".into(),
            nametag: "DEV".into(),
        };
        let payload = add_to_roster(&entry);
        let mut r = BitReader::new(&payload);
        r.read_u8().unwrap();
        assert_eq!(r.read_u32().unwrap(), 1001);
        assert_eq!(r.read_i32().unwrap(), 2);
        r.read_i16().unwrap();
        r.read_i16().unwrap();
        assert_eq!(r.read_string().unwrap(), "pilot");
        assert_eq!(r.read_string().unwrap(), "DEV");
    }

    #[test]
    fn test_entity_spawn_with_vitals() {
        let table = TranslationTable::default();
        let spawn = TankSpawn {
            ticks: 500,
            unit_type: 0,
            net_id: 1001,
            flags: 1,
            position: Vec3::new(100.0, 100.0, 100.0),
            velocity: Vec3::ZERO,
            vitals: Some(TankVitals {
                weapon_id: 0,
                health: 1.0,
                energy: 1.0,
            }),
        };
        let payload = entity_spawn(&spawn, &table);
        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::ENTITY_SPAWN);
        assert_eq!(r.read_u32().unwrap(), 500);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_bits(5).unwrap(), 0);
        assert_eq!(table.get(SLOT_HEALTH).read_scalar(&mut r).unwrap(), 1.0);
        assert_eq!(table.get(SLOT_ENERGY).read_scalar(&mut r).unwrap(), 1.0);
        assert_eq!(r.read_i32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 1001);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_vec3_fixed().unwrap(), Vec3::splat(100.0));
        assert_eq!(r.read_vec3_fixed().unwrap(), Vec3::ZERO);
    }

    #[test]
    fn test_stream_definitions() {
        let payload = stream_definitions(9, 1001);
        let mut r = BitReader::new(&payload);
        assert_eq!(r.read_u8().unwrap(), opcode::STREAM_HANDSHAKE);
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.read_u32().unwrap(), 1001);
        assert_eq!(r.read_i32().unwrap(), 4);
        for (id, name) in STREAM_NAMES.iter().enumerate() {
            assert_eq!(&r.read_string().unwrap(), name);
            assert_eq!(r.read_i32().unwrap(), 1);
            assert_eq!(r.read_i32().unwrap(), id as i32);
        }
        assert_eq!(r.read_i32().unwrap(), 4);
    }
}
