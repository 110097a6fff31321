use std::time::Instant;

use super::bitstream::BitstreamError;

pub const DEFAULT_TCP_PORT: u16 = 2627;
pub const DEFAULT_UDP_PORT: u16 = 2627;
pub const DEFAULT_TICK_RATE: u32 = 5;
pub const MAX_DATAGRAM_SIZE: usize = 4096;
/// Wire limit on entities in a single update-array message.
pub const MAX_ENTITIES_PER_UPDATE: usize = 255;

/// Opcode values. TCP and UDP share the byte space but not the meaning of
/// every value, so handlers are registered per transport.
pub mod opcode {
    pub const DEBUG_STRING: u8 = 0x00;
    pub const ACK: u8 = 0x02;
    /// Inbound UDP stream handshake; outbound it carries stream definitions.
    pub const STREAM_HANDSHAKE: u8 = 0x03;
    pub const STREAM_SET_START: u8 = 0x04;
    pub const UDP_PROBE: u8 = 0x08;
    pub const ACTION_DUMP: u8 = 0x09;
    pub const ACTION_UPDATE: u8 = 0x0A;
    pub const PING_REQUEST: u8 = 0x0B;
    pub const PING_REPLY: u8 = 0x0C;
    /// Periodic client status with no server-side meaning.
    pub const CLIENT_STATUS: u8 = 0x10;
    pub const UPDATE_ARRAY: u8 = 0x0E;
    pub const VIEW_UPDATE: u8 = 0x0F;
    pub const HELLO: u8 = 0x13;
    pub const WORLD_STATS: u8 = 0x16;
    pub const PLAYER_INFO: u8 = 0x17;
    pub const ENTITY_SPAWN: u8 = 0x18;
    pub const ENTITY_REMOVE: u8 = 0x19;
    pub const ADD_TO_ROSTER: u8 = 0x1A;
    pub const UPDATE_STATS: u8 = 0x1C;
    pub const DEATH_NOTICE: u8 = 0x1D;
    pub const COMM_MESSAGE: u8 = 0x1F;
    pub const CHAT: u8 = 0x20;
    pub const LOGIN: u8 = 0x21;
    pub const LOGIN_STATUS: u8 = 0x22;
    pub const MOTD: u8 = 0x23;
    pub const BEHAVIOR: u8 = 0x24;
    pub const REINCARNATE: u8 = 0x25;
    pub const TEAM_INFO: u8 = 0x28;
    pub const GAME_CLOCK: u8 = 0x2F;
    pub const TRANSLATION: u8 = 0x32;
    pub const ACK2: u8 = 0x33;
    pub const VIEWPOINT: u8 = 0x35;
    pub const WANT_UPDATES: u8 = 0x39;
    pub const BEACON: u8 = 0x3A;
    pub const RESET_GAME: u8 = 0x3F;
    pub const KEEP_ALIVE: u8 = 0x40;
    pub const ROUTING_PING: u8 = 0x4C;
    /// Update-array id used by older clients; sent by the client, never by us.
    pub const LEGACY_UPDATE_ARRAY: u8 = 0x49;
    pub const IDENTIFIED_UDP: u8 = 0x4D;
    pub const BPS_REQUEST: u8 = 0x4E;
    pub const KUDOS: u8 = 0x4F;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HelloSubCommand {
    Version = 0x00,
    UdpConfig = 0x01,
    SessionKey = 0x02,
    Verified = 0x03,
}

impl TryFrom<u8> for HelloSubCommand {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Version),
            0x01 => Ok(Self::UdpConfig),
            0x02 => Ok(Self::SessionKey),
            0x03 => Ok(Self::Verified),
            other => Err(PacketError::UnknownSubCommand {
                opcode: opcode::HELLO,
                sub: other,
            }),
        }
    }
}

/// Codes carried by the login status message.
pub mod login_status {
    pub const REQUEST_PASSWORD: u8 = 1;
    pub const LOGGED_IN: u8 = 8;
}

/// Codes carried by the reincarnate status message.
pub mod reincarnate {
    pub const NOT_READY: u8 = 4;
    pub const TEAM_SWITCHED: u8 = 17;
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("packet 0x{opcode:02X} too short: {len} bytes, need {min}")]
    TooShort { opcode: u8, len: usize, min: usize },
    #[error("unknown sub-command 0x{sub:02X} for packet 0x{opcode:02X}")]
    UnknownSubCommand { opcode: u8, sub: u8 },
    #[error("invalid frame length {declared} (buffer holds {available})")]
    BadFrameLength { declared: usize, available: usize },
    #[error("payload of {0} bytes does not fit a frame")]
    FrameTooLarge(usize),
    #[error("malformed packet: {0}")]
    Malformed(#[from] BitstreamError),
}

/// Returns the payload's opcode after checking the minimum length.
pub fn expect_len(payload: &[u8], min: usize) -> Result<u8, PacketError> {
    let Some(&op) = payload.first() else {
        return Err(PacketError::Empty);
    };
    if payload.len() < min {
        return Err(PacketError::TooShort {
            opcode: op,
            len: payload.len(),
            min,
        });
    }
    Ok(op)
}

/// Millisecond tick counter shared by every time-stamped message.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    start: Instant,
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since start, wrapping at 32 bits.
    pub fn ticks(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}
