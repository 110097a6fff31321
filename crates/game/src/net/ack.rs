//! One-shot acknowledgement for sequenced UDP requests. No retransmission
//! or duplicate suppression happens on either side.

use super::bitstream::{BitReader, BitWriter};
use super::protocol::{PacketError, expect_len, opcode};

pub const ACK_BODY_LEN: u16 = 9;
pub const ACK_SUB_COMMAND: u8 = 1;

/// Request opcodes that get an ACK when received over UDP.
pub const ACKED_OPCODES: [u8; 5] = [
    opcode::CHAT,
    opcode::BEACON,
    opcode::REINCARNATE,
    opcode::VIEWPOINT,
    opcode::ACK2,
];

pub fn requires_ack(op: u8) -> bool {
    ACKED_OPCODES.contains(&op)
}

/// `[0x02][out seq u16][9 u16][1 u8][acked opcode u8][echoed seq u16]`
pub fn build_ack(outgoing_seq: u16, acked_opcode: u8, echoed_seq: u16) -> Vec<u8> {
    let mut w = BitWriter::with_capacity(9);
    w.write_u8(opcode::ACK);
    w.write_u16(outgoing_seq);
    w.write_u16(ACK_BODY_LEN);
    w.write_u8(ACK_SUB_COMMAND);
    w.write_u8(acked_opcode);
    w.write_u16(echoed_seq);
    w.into_bytes()
}

/// Header shared by sequenced UDP requests: `[op][seq u16][len u16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencedHeader {
    pub opcode: u8,
    pub seq: u16,
    pub len: u16,
}

impl SequencedHeader {
    pub const SIZE: usize = 5;

    /// Reads the header and leaves the reader positioned at the body.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            opcode: reader.read_u8()?,
            seq: reader.read_u16()?,
            len: reader.read_u16()?,
        })
    }

    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        expect_len(payload, Self::SIZE)?;
        Self::read(&mut BitReader::new(payload))
    }
}
