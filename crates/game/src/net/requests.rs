//! Parsers for client-to-server messages. Each takes the full payload,
//! opcode byte included.

use super::ack::SequencedHeader;
use super::bitstream::{BitReader, ReadMode};
use super::protocol::{HelloSubCommand, PacketError, expect_len};

/// TCP hello from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloRequest {
    pub sub: HelloSubCommand,
}

impl HelloRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, 2)?;
        Ok(Self {
            sub: HelloSubCommand::try_from(payload[1])?,
        })
    }
}

/// Session key echoed over UDP: `[0x13][sub][key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEcho {
    pub sub: u8,
    pub key: String,
}

impl KeyEcho {
    pub fn parse(payload: &[u8], mode: ReadMode) -> Result<Self, PacketError> {
        expect_len(payload, 4)?;
        let mut r = BitReader::with_mode(payload, mode);
        r.read_u8()?;
        Ok(Self {
            sub: r.read_u8()?,
            key: r.read_string()?,
        })
    }
}

/// One login round: username first, then password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub sub: u8,
    pub text: String,
}

impl LoginRequest {
    pub fn parse(payload: &[u8], mode: ReadMode) -> Result<Self, PacketError> {
        expect_len(payload, 2)?;
        let mut r = BitReader::with_mode(payload, mode);
        r.read_u8()?;
        let sub = r.read_u8()?;
        let text = if r.is_at_end() {
            String::new()
        } else {
            r.read_string()?
        };
        Ok(Self { sub, text })
    }
}

/// A ping or pong carrying a single 32-bit timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub i32);

impl Timestamp {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, 5)?;
        let mut r = BitReader::new(payload);
        r.read_u8()?;
        Ok(Self(r.read_i32()?))
    }
}

/// Client asking the server to cap its send rate, in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpsRequest {
    pub rate: u32,
}

impl BpsRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, 5)?;
        let mut r = BitReader::new(payload);
        r.read_u8()?;
        Ok(Self { rate: r.read_u32()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub header: SequencedHeader,
    pub scope: u16,
    pub target: u16,
    pub text: String,
}

impl ChatRequest {
    pub fn parse(payload: &[u8], mode: ReadMode) -> Result<Self, PacketError> {
        expect_len(payload, 10)?;
        let mut r = BitReader::with_mode(payload, mode);
        let header = SequencedHeader::read(&mut r)?;
        Ok(Self {
            header,
            scope: r.read_u16()?,
            target: r.read_u16()?,
            text: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReincarnateKind {
    /// Spawn at the repair pad with the given net id.
    Spawn { pad: u32, extra: [i32; 2] },
    TeamSwitch { team: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReincarnateRequest {
    pub header: SequencedHeader,
    pub unit_type: i32,
    pub kind: ReincarnateKind,
}

impl ReincarnateRequest {
    pub fn parse(payload: &[u8], mode: ReadMode) -> Result<Self, PacketError> {
        expect_len(payload, SequencedHeader::SIZE + 9)?;
        let mut r = BitReader::with_mode(payload, mode);
        let header = SequencedHeader::read(&mut r)?;
        let is_team_switch = r.read_u8()? == 1;
        let team_or_pad = r.read_i32()?;
        let unit_type = r.read_i32()?;

        let kind = if is_team_switch {
            ReincarnateKind::TeamSwitch { team: team_or_pad }
        } else {
            ReincarnateKind::Spawn {
                pad: team_or_pad as u32,
                extra: [r.read_i32()?, r.read_i32()?],
            }
        };

        Ok(Self {
            header,
            unit_type,
            kind,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconRequest {
    pub header: SequencedHeader,
    pub target: i32,
}

impl BeaconRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, SequencedHeader::SIZE + 4)?;
        let mut r = BitReader::new(payload);
        Ok(Self {
            header: SequencedHeader::read(&mut r)?,
            target: r.read_i32()?,
        })
    }
}

/// The client's confirmation that it processed the translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack2 {
    pub header: SequencedHeader,
    pub status: i32,
}

impl Ack2 {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, SequencedHeader::SIZE + 4)?;
        let mut r = BitReader::new(payload);
        Ok(Self {
            header: SequencedHeader::read(&mut r)?,
            status: r.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandshake {
    pub timestamp: i32,
    pub connection_id: i32,
    pub stream_count: i32,
}

impl StreamHandshake {
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, 13)?;
        let mut r = BitReader::new(payload);
        r.read_u8()?;
        Ok(Self {
            timestamp: r.read_i32()?,
            connection_id: r.read_i32()?,
            stream_count: r.read_i32()?,
        })
    }
}

/// `[0x00][len u8][text]`
pub fn parse_debug_string(payload: &[u8]) -> Result<String, PacketError> {
    expect_len(payload, 2)?;
    let text = &payload[2..];
    Ok(text
        .iter()
        .copied()
        .filter(|&b| b != 0 && b.is_ascii())
        .map(char::from)
        .collect::<String>()
        .trim()
        .to_string())
}
