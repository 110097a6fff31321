//! Transport envelopes. TCP frames carry a big-endian u16 total length that
//! counts the two header bytes. UDP datagrams are usually bare but may carry
//! the same header, and may batch a debug string ahead of another packet.

use super::protocol::{PacketError, opcode};

pub const TCP_HEADER_LEN: usize = 2;

pub fn encode_tcp_frame(payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    let total = payload.len() + TCP_HEADER_LEN;
    let Ok(total_u16) = u16::try_from(total) else {
        return Err(PacketError::FrameTooLarge(payload.len()));
    };

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&total_u16.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Body length announced by a TCP frame header.
pub fn tcp_body_len(header: [u8; TCP_HEADER_LEN]) -> Result<usize, PacketError> {
    let declared = u16::from_be_bytes(header) as usize;
    if declared < TCP_HEADER_LEN {
        return Err(PacketError::BadFrameLength {
            declared,
            available: TCP_HEADER_LEN,
        });
    }
    Ok(declared - TCP_HEADER_LEN)
}

/// Drops the optional length header when it matches the datagram size.
pub fn strip_udp_length(datagram: &[u8]) -> &[u8] {
    if datagram.len() >= 3 {
        let declared = u16::from_be_bytes([datagram[0], datagram[1]]) as usize;
        if declared == datagram.len() {
            return &datagram[TCP_HEADER_LEN..];
        }
    }
    datagram
}

/// Splits one datagram into opcode-first payloads.
///
/// A debug string (`[00][len][text]`) is self-delimiting; any other opcode
/// consumes the remainder of the datagram.
pub fn split_datagram(datagram: &[u8]) -> Vec<&[u8]> {
    let data = strip_udp_length(datagram);
    let mut payloads = Vec::new();
    let mut cursor = 0;

    while cursor < data.len() {
        let rest = &data[cursor..];
        if rest[0] == opcode::DEBUG_STRING && rest.len() >= 2 {
            let size = 2 + rest[1] as usize;
            if size <= rest.len() {
                payloads.push(&rest[..size]);
                cursor += size;
                continue;
            }
        }
        payloads.push(rest);
        break;
    }

    payloads
}
