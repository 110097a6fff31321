//! Range/precision parameterised float quantization and the translation
//! table that configures it on the client.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::bitstream::{BitReader, BitWriter, BitstreamError};

pub const TRANSLATION_SLOTS: usize = 28;
pub const VECTOR_BANKS: usize = 3;
pub const FIRST_VECTOR_SLOT: usize = 16;

pub const SLOT_BANK_SELECTOR: usize = 0;
pub const SLOT_WEAPON: usize = 1;
pub const SLOT_UNIT_TYPE: usize = 2;
pub const SLOT_TEAM: usize = 3;
pub const SLOT_CARGO_TYPE: usize = 4;
pub const SLOT_HEALTH: usize = 5;
pub const SLOT_ENERGY: usize = 8;

/// Widest data field a profile may select. Wider headers still parse, but
/// their extra priority adds no bits past this.
pub const MAX_DATA_BITS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationProfile {
    pub precision_header_bits: u32,
    /// Zero or negative selects fixed mode.
    pub max_total_bits: i32,
    pub max_value: f64,
    pub range: f64,
}

/// One quantized scalar ready for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    pub priority: u32,
    pub raw: u64,
    pub bits: u32,
}

impl QuantizationProfile {
    pub const fn new(precision_header_bits: u32, max_total_bits: i32, max_value: f64, range: f64) -> Self {
        Self {
            precision_header_bits,
            max_total_bits,
            max_value,
            range,
        }
    }

    pub const fn fixed(bits: u32, max_value: f64, range: f64) -> Self {
        Self::new(bits, 0, max_value, range)
    }

    pub fn is_fixed(&self) -> bool {
        self.max_total_bits <= 0
    }

    pub fn min_value(&self) -> f64 {
        self.max_value - self.range
    }

    pub fn precision_base_bits(&self) -> u32 {
        if self.is_fixed() {
            return self.precision_header_bits;
        }
        let resolution = 1i64 << self.precision_header_bits.min(62);
        (self.max_total_bits as i64 - resolution + 1).max(1) as u32
    }

    /// Highest priority the header can carry; always 0 in fixed mode.
    pub fn max_priority(&self) -> u32 {
        if self.is_fixed() {
            0
        } else {
            ((1u64 << self.precision_header_bits.min(32)) - 1) as u32
        }
    }

    pub fn data_bits(&self, priority: u32) -> u32 {
        let bits = if self.is_fixed() {
            self.precision_base_bits()
        } else {
            self.precision_base_bits()
                .saturating_add(priority.min(self.max_priority()))
        };
        bits.min(MAX_DATA_BITS)
    }

    fn denominator(bits: u32) -> f64 {
        let denom = 2f64.powi(bits as i32) - 2.0;
        if denom <= 0.0 { 1.0 } else { denom }
    }

    /// Size of one quantization step at the given priority.
    pub fn step(&self, priority: u32) -> f64 {
        self.range / Self::denominator(self.data_bits(priority))
    }

    pub fn quantize(&self, value: f32, priority: u32) -> Quantized {
        let priority = if self.is_fixed() {
            0
        } else {
            priority.min(self.max_priority())
        };
        let bits = self.data_bits(priority);

        // Exact zero is a reserved sentinel and bypasses clamping.
        if value == 0.0 {
            return Quantized {
                priority,
                raw: 0,
                bits,
            };
        }

        let clamped = (value as f64).max(self.min_value()).min(self.max_value);
        let raw = if self.range == 0.0 {
            1
        } else {
            let scaled = (self.max_value - clamped) * Self::denominator(bits) / self.range;
            (scaled.floor() as u64 + 1).min((1u64 << bits) - 1)
        };

        Quantized {
            priority,
            raw,
            bits,
        }
    }

    pub fn dequantize(&self, priority: u32, raw: u64) -> f32 {
        if raw == 0 {
            return 0.0;
        }
        if self.range == 0.0 {
            return self.max_value as f32;
        }
        let denom = Self::denominator(self.data_bits(priority));
        (self.max_value - (raw - 1) as f64 * self.range / denom) as f32
    }

    pub fn write_scalar(&self, writer: &mut BitWriter, value: f32, policy: &dyn PrecisionPolicy) {
        let q = self.quantize(value, policy.priority(self));
        if !self.is_fixed() {
            writer.write_bits(q.priority as u64, self.precision_header_bits);
        }
        writer.write_bits(q.raw, q.bits);
    }

    pub fn read_scalar(&self, reader: &mut BitReader<'_>) -> Result<f32, BitstreamError> {
        let priority = self.read_header(reader)?;
        let raw = reader.read_bits(self.data_bits(priority))?;
        Ok(self.dequantize(priority, raw))
    }

    /// Writes three components behind a single shared priority header.
    pub fn write_vec3(&self, writer: &mut BitWriter, value: Vec3, policy: &dyn PrecisionPolicy) {
        let priority = policy.priority(self);
        let components = value.to_array().map(|c| self.quantize(c, priority));
        if !self.is_fixed() {
            writer.write_bits(components[0].priority as u64, self.precision_header_bits);
        }
        for q in components {
            writer.write_bits(q.raw, q.bits);
        }
    }

    pub fn read_vec3(&self, reader: &mut BitReader<'_>) -> Result<Vec3, BitstreamError> {
        let priority = self.read_header(reader)?;
        let bits = self.data_bits(priority);
        let mut out = [0.0f32; 3];
        for c in &mut out {
            *c = self.dequantize(priority, reader.read_bits(bits)?);
        }
        Ok(Vec3::from_array(out))
    }

    fn read_header(&self, reader: &mut BitReader<'_>) -> Result<u32, BitstreamError> {
        if self.is_fixed() {
            Ok(0)
        } else {
            Ok(reader.read_bits(self.precision_header_bits)? as u32)
        }
    }
}

/// Chooses the priority (extra precision bits) for a dynamic-mode field.
pub trait PrecisionPolicy: fmt::Debug + Send + Sync {
    fn priority(&self, profile: &QuantizationProfile) -> u32;
}

/// Always the finest resolution the profile allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxPrecision;

impl PrecisionPolicy for MaxPrecision {
    fn priority(&self, profile: &QuantizationProfile) -> u32 {
        profile.max_priority()
    }
}

/// A constant priority, capped to what each profile's header can express.
#[derive(Debug, Clone, Copy)]
pub struct FixedPriority(pub u32);

impl PrecisionPolicy for FixedPriority {
    fn priority(&self, profile: &QuantizationProfile) -> u32 {
        self.0.min(profile.max_priority())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorField {
    Position = 0,
    Velocity = 1,
    Rotation = 2,
    Spin = 3,
}

const SCALAR_DEFAULT: QuantizationProfile = QuantizationProfile::fixed(16, 1000.0, 2000.0);
const ID_FIELD: QuantizationProfile = QuantizationProfile::fixed(8, 0.0, 0.0);
const VITAL: QuantizationProfile = QuantizationProfile::fixed(10, 1.0, 1.0);
const VITAL_EXTRA: QuantizationProfile = QuantizationProfile::fixed(8, 1.0, 1.0);

const VEC_POSITION: QuantizationProfile = QuantizationProfile::new(4, 16, 8192.0, 16384.0);
const VEC_VELOCITY: QuantizationProfile = QuantizationProfile::new(4, 16, 1000.0, 2000.0);
const VEC_ROTATION: QuantizationProfile = QuantizationProfile::new(4, 16, 6.3, 12.6);
const VEC_SPIN: QuantizationProfile = QuantizationProfile::new(4, 16, 200.0, 400.0);

/// The 28 quantization slots announced to the client with the translation
/// message. The encoder reads its widths from the same table instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationTable {
    slots: [QuantizationProfile; TRANSLATION_SLOTS],
}

impl Default for TranslationTable {
    fn default() -> Self {
        let mut slots = [SCALAR_DEFAULT; TRANSLATION_SLOTS];
        slots[SLOT_WEAPON] = QuantizationProfile::fixed(5, 0.0, 0.0);
        slots[SLOT_UNIT_TYPE] = ID_FIELD;
        slots[SLOT_TEAM] = ID_FIELD;
        slots[SLOT_CARGO_TYPE] = ID_FIELD;
        slots[SLOT_HEALTH] = VITAL;
        slots[SLOT_ENERGY] = VITAL;
        slots[13] = VITAL_EXTRA;
        slots[14] = VITAL_EXTRA;

        for bank in 0..VECTOR_BANKS {
            let base = FIRST_VECTOR_SLOT + bank * 4;
            slots[base + VectorField::Position as usize] = VEC_POSITION;
            slots[base + VectorField::Velocity as usize] = VEC_VELOCITY;
            slots[base + VectorField::Rotation as usize] = VEC_ROTATION;
            slots[base + VectorField::Spin as usize] = VEC_SPIN;
        }

        Self { slots }
    }
}

impl TranslationTable {
    pub fn new(slots: [QuantizationProfile; TRANSLATION_SLOTS]) -> Self {
        Self { slots }
    }

    /// Out of range lookups fall back to the generic scalar profile.
    pub fn get(&self, index: usize) -> &QuantizationProfile {
        self.slots.get(index).unwrap_or(&SCALAR_DEFAULT)
    }

    pub fn set(&mut self, index: usize, profile: QuantizationProfile) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = profile;
                true
            }
            None => false,
        }
    }

    pub fn slots(&self) -> &[QuantizationProfile] {
        &self.slots
    }

    /// Table index of the first profile in a vector bank.
    pub fn bank_base(bank: usize) -> usize {
        FIRST_VECTOR_SLOT + bank.min(VECTOR_BANKS - 1) * 4
    }

    pub fn vector(&self, bank: usize, field: VectorField) -> &QuantizationProfile {
        self.get(Self::bank_base(bank) + field as usize)
    }

    /// Width of a raw integer field whose size is configured by a fixed slot.
    pub fn field_bits(&self, index: usize) -> u32 {
        self.get(index).precision_base_bits()
    }

    pub fn bank_selector_bits(&self) -> u32 {
        self.field_bits(SLOT_BANK_SELECTOR)
    }
}
