//! MSB-first bit packing used by every message body on the wire.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Upper bound on a Pascal string length prefix accepted by the reader.
pub const MAX_STRING_LEN: usize = 4096;

const FIXED_SCALE: f64 = 65536.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitstreamError {
    #[error("read past end of stream: wanted {wanted} bits, {remaining} left")]
    UnexpectedEof { wanted: u32, remaining: usize },
    #[error("string length {0} exceeds the {MAX_STRING_LEN} byte limit")]
    StringTooLong(usize),
    #[error("bit width {0} exceeds 64")]
    WidthTooLarge(u32),
}

/// What a reader does when a field runs off the end of the buffer.
///
/// `Lenient` reproduces the legacy client behaviour: the whole field reads as
/// zero and the cursor parks at the end. `Strict` reports the truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadMode {
    #[default]
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    // Bits already used in the last byte of `buf`; 0 means byte aligned.
    bit_pos: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            bit_pos: 0,
        }
    }

    /// Appends the low `bits` bits of `value`, most significant bit first.
    ///
    /// Widths above 64 are written as leading zero bits.
    pub fn write_bits(&mut self, value: u64, bits: u32) {
        for i in (0..bits).rev() {
            let bit = i < 64 && (value >> i) & 1 == 1;
            self.push_bit(bit);
        }
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_pos == 0 {
            self.buf.push(0);
        }
        if bit {
            if let Some(last) = self.buf.last_mut() {
                *last |= 0x80 >> self.bit_pos;
            }
        }
        self.bit_pos = (self.bit_pos + 1) % 8;
    }

    /// Zero-pads to the next byte boundary.
    pub fn align(&mut self) {
        self.bit_pos = 0;
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(value as u64, 1);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value as u64, 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u64, 16);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bits(value as u16 as u64, 16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value as u64, 32);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bits(value as u32 as u64, 32);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// 16.16 fixed point: `round(v * 65536)` truncated to 32 bits.
    pub fn write_fixed(&mut self, value: f32) {
        let raw = (value as f64 * FIXED_SCALE).round() as i64;
        self.write_u32(raw as u32);
    }

    pub fn write_vec3_fixed(&mut self, v: Vec3) {
        self.write_fixed(v.x);
        self.write_fixed(v.y);
        self.write_fixed(v.z);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        for &b in data {
            self.write_u8(b);
        }
    }

    /// Pascal string: u16 length counting the trailing NUL, then ASCII bytes.
    ///
    /// Non-ASCII characters are sent as `?`. Text longer than the reader's
    /// limit is cut so the peer never rejects it.
    pub fn write_string(&mut self, text: &str) {
        let mut raw: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .take(MAX_STRING_LEN - 1)
            .collect();
        raw.push(0);

        self.write_u16(raw.len() as u16);
        self.write_bytes(&raw);
    }

    pub fn bit_len(&self) -> usize {
        if self.bit_pos == 0 {
            self.buf.len() * 8
        } else {
            (self.buf.len() - 1) * 8 + self.bit_pos as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finishes the stream; a partial last byte is zero padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    mode: ReadMode,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_mode(data, ReadMode::Strict)
    }

    pub fn with_mode(data: &'a [u8], mode: ReadMode) -> Self {
        Self { data, pos: 0, mode }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.bits_remaining() == 0
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u64, BitstreamError> {
        if bits > 64 {
            return Err(BitstreamError::WidthTooLarge(bits));
        }

        let remaining = self.bits_remaining();
        if (bits as usize) > remaining {
            return match self.mode {
                ReadMode::Strict => Err(BitstreamError::UnexpectedEof {
                    wanted: bits,
                    remaining,
                }),
                ReadMode::Lenient => {
                    self.pos = self.data.len() * 8;
                    Ok(0)
                }
            };
        }

        let mut value = 0u64;
        for _ in 0..bits {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | bit as u64;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Skips to the next byte boundary.
    pub fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    pub fn read_bool(&mut self) -> Result<bool, BitstreamError> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_u8(&mut self) -> Result<u8, BitstreamError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, BitstreamError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, BitstreamError> {
        Ok(self.read_bits(16)? as u16 as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, BitstreamError> {
        Ok(self.read_bits(32)? as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, BitstreamError> {
        Ok(self.read_bits(32)? as u32 as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, BitstreamError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_fixed(&mut self) -> Result<f32, BitstreamError> {
        Ok((self.read_i32()? as f64 / FIXED_SCALE) as f32)
    }

    pub fn read_vec3_fixed(&mut self) -> Result<Vec3, BitstreamError> {
        Ok(Vec3::new(
            self.read_fixed()?,
            self.read_fixed()?,
            self.read_fixed()?,
        ))
    }

    pub fn read_string(&mut self) -> Result<String, BitstreamError> {
        let len = self.read_u16()? as usize;
        if len > MAX_STRING_LEN {
            return match self.mode {
                ReadMode::Strict => Err(BitstreamError::StringTooLong(len)),
                ReadMode::Lenient => Ok(String::new()),
            };
        }

        let mut raw = Vec::with_capacity(len);
        for _ in 0..len {
            raw.push(self.read_u8()?);
        }
        if raw.last() == Some(&0) {
            raw.pop();
        }

        Ok(raw
            .into_iter()
            .filter(u8::is_ascii)
            .map(char::from)
            .collect())
    }

    /// Everything from the next byte boundary to the end of the buffer.
    pub fn read_remainder(&mut self) -> &'a [u8] {
        self.align();
        let start = (self.pos / 8).min(self.data.len());
        self.pos = self.data.len() * 8;
        &self.data[start..]
    }
}
