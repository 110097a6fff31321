//! Bit-packed world update messages (0x0E delta, 0x0F view).
//!
//! Body layout, after the opcode byte:
//!
//! ```text
//! u32 tick stamp
//! 1 bit local stats present
//!   [weapon bits][health][energy]
//! u8 entity count
//! per entity:
//!   i32 net id, 1 bit manned, 10 bit mask, bank selector,
//!   then one block per set mask bit in ascending bit order
//! ```

use glam::Vec3;
use thiserror::Error;

use crate::net::{
    BitReader, BitWriter, BitstreamError, MAX_ENTITIES_PER_UPDATE, MaxPrecision, PrecisionPolicy,
    SLOT_CARGO_TYPE, SLOT_ENERGY, SLOT_HEALTH, SLOT_TEAM, SLOT_UNIT_TYPE, SLOT_WEAPON,
    TranslationTable, VectorField, opcode,
};

use super::entity::{DirtyMask, Entity, UNIT_CARGO_CARRIER, UNIT_CARGO_CRATE};

/// Only bank 0 is ever selected.
pub const DEFAULT_BANK: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateArrayError {
    #[error("{0} entities exceed the per-message limit of {MAX_ENTITIES_PER_UPDATE}")]
    TooManyEntities(usize),
    #[error("unexpected opcode 0x{0:02X} for an update array")]
    WrongOpcode(u8),
    #[error(transparent)]
    Malformed(#[from] BitstreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Entities changed since the last tick.
    Delta,
    /// Full world view for a viewer that just joined.
    View,
}

impl UpdateKind {
    pub fn opcode(self) -> u8 {
        match self {
            UpdateKind::Delta => opcode::UPDATE_ARRAY,
            UpdateKind::View => opcode::VIEW_UPDATE,
        }
    }
}

/// HUD vitals of the receiving player's own vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalStats {
    pub health: f32,
    pub energy: f32,
}

/// An entity paired with the mask to emit for it. The mask is a copy, so
/// forced views never touch the entity's own pending bits.
#[derive(Debug, Clone, Copy)]
pub struct UpdateEntry<'e> {
    pub entity: &'e Entity,
    pub mask: DirtyMask,
}

impl<'e> UpdateEntry<'e> {
    pub fn pending(entity: &'e Entity) -> Self {
        Self {
            entity,
            mask: entity.pending_mask(),
        }
    }

    pub fn forced(entity: &'e Entity, extra: DirtyMask) -> Self {
        Self {
            entity,
            mask: entity.pending_mask() | extra,
        }
    }
}

/// Serializes update arrays with the widths of one translation table.
#[derive(Debug, Clone, Copy)]
pub struct UpdateArrayEncoder<'t> {
    table: &'t TranslationTable,
    policy: &'t dyn PrecisionPolicy,
}

impl<'t> UpdateArrayEncoder<'t> {
    pub fn new(table: &'t TranslationTable) -> Self {
        Self {
            table,
            policy: &MaxPrecision,
        }
    }

    pub fn with_policy(table: &'t TranslationTable, policy: &'t dyn PrecisionPolicy) -> Self {
        Self { table, policy }
    }

    pub fn table(&self) -> &TranslationTable {
        self.table
    }

    /// Encodes one message. Fails if more entries are given than the 8-bit
    /// count can address.
    pub fn encode(
        &self,
        kind: UpdateKind,
        ticks: u32,
        local: Option<LocalStats>,
        entries: &[UpdateEntry<'_>],
    ) -> Result<Vec<u8>, UpdateArrayError> {
        if entries.len() > MAX_ENTITIES_PER_UPDATE {
            return Err(UpdateArrayError::TooManyEntities(entries.len()));
        }

        let mut w = BitWriter::with_capacity(16 + entries.len() * 32);
        w.write_u8(kind.opcode());
        w.write_u32(ticks);
        self.write_local_stats(&mut w, local);

        w.write_u8(entries.len() as u8);
        for entry in entries {
            self.write_entity(&mut w, entry);
        }
        Ok(w.into_bytes())
    }

    /// Splits entries into as many messages as the count limit requires.
    /// Local stats ride on the first page only.
    pub fn encode_paginated(
        &self,
        kind: UpdateKind,
        ticks: u32,
        local: Option<LocalStats>,
        entries: &[UpdateEntry<'_>],
    ) -> Vec<Vec<u8>> {
        if entries.is_empty() {
            return match self.encode(kind, ticks, local, &[]) {
                Ok(packet) if local.is_some() => vec![packet],
                _ => Vec::new(),
            };
        }

        let mut pages = Vec::with_capacity(entries.len().div_ceil(MAX_ENTITIES_PER_UPDATE));
        for (i, chunk) in entries.chunks(MAX_ENTITIES_PER_UPDATE).enumerate() {
            let stats = if i == 0 { local } else { None };
            match self.encode(kind, ticks, stats, chunk) {
                Ok(packet) => pages.push(packet),
                Err(e) => log::error!("Update array page {} failed: {}", i, e),
            }
        }
        pages
    }

    fn write_local_stats(&self, w: &mut BitWriter, local: Option<LocalStats>) {
        let Some(stats) = local else {
            w.write_bool(false);
            return;
        };
        w.write_bool(true);
        w.write_bits(0, self.table.field_bits(SLOT_WEAPON));
        self.table
            .get(SLOT_HEALTH)
            .write_scalar(w, stats.health, self.policy);
        self.table
            .get(SLOT_ENERGY)
            .write_scalar(w, stats.energy, self.policy);
    }

    fn write_entity(&self, w: &mut BitWriter, entry: &UpdateEntry<'_>) {
        let entity = entry.entity;
        let mask = entry.mask;

        w.write_i32(entity.net_id() as i32);
        w.write_bool(entity.is_manned);
        w.write_bits(mask.bits() as u64, DirtyMask::WIRE_BITS);
        w.write_bits(
            TranslationTable::bank_base(DEFAULT_BANK) as u64,
            self.table.bank_selector_bits(),
        );

        if mask.contains(DirtyMask::DEFINITION) {
            let unit_bits = self.table.field_bits(SLOT_UNIT_TYPE);
            let team_bits = self.table.field_bits(SLOT_TEAM);
            w.write_bits(entity.unit_type as u64, unit_bits);
            w.write_bits(entity.team as u64, team_bits);
            w.write_bits(entity.team as u64, team_bits);
            if entity.carries_cargo_field() {
                w.write_bits(
                    entity.cargo_type as u64,
                    self.table.field_bits(SLOT_CARGO_TYPE),
                );
            }
            // snap to position on creation
            w.write_bool(true);
        }

        let vectors = [
            (DirtyMask::POSITION, VectorField::Position, entity.position),
            (DirtyMask::VELOCITY, VectorField::Velocity, entity.velocity),
            (DirtyMask::ROTATION, VectorField::Rotation, entity.rotation),
            (DirtyMask::SPIN, VectorField::Spin, entity.spin),
        ];
        for (bit, field, value) in vectors {
            if mask.contains(bit) {
                self.table
                    .vector(DEFAULT_BANK, field)
                    .write_vec3(w, value, self.policy);
            }
        }

        if mask.contains(DirtyMask::HEALTH) {
            self.table
                .get(SLOT_HEALTH)
                .write_scalar(w, entity.health, self.policy);
        }
        // WEAPON: the inventory block is not populated and emits nothing.
        if mask.contains(DirtyMask::ENERGY) {
            self.table
                .get(SLOT_ENERGY)
                .write_scalar(w, entity.energy, self.policy);
        }
        if mask.contains(DirtyMask::OWNER) {
            w.write_i32(entity.owner);
        }
        // HARD_SYNC is carried by the mask bit alone.
    }
}

/// One entity as read back from an update array.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntity {
    pub net_id: i32,
    pub is_manned: bool,
    pub mask: DirtyMask,
    pub bank_selector: u64,
    pub unit_type: Option<u32>,
    pub team: Option<u32>,
    pub cargo_type: Option<u32>,
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub spin: Option<Vec3>,
    pub health: Option<f32>,
    pub energy: Option<f32>,
    pub owner: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpdate {
    pub kind: UpdateKind,
    pub ticks: u32,
    pub local: Option<LocalStats>,
    pub entities: Vec<DecodedEntity>,
}

/// Reads an update array with the same table that produced it. Used for
/// packet traces and to verify encoder output.
pub fn decode(payload: &[u8], table: &TranslationTable) -> Result<DecodedUpdate, UpdateArrayError> {
    let mut r = BitReader::new(payload);
    let kind = match r.read_u8()? {
        opcode::UPDATE_ARRAY => UpdateKind::Delta,
        opcode::VIEW_UPDATE => UpdateKind::View,
        other => return Err(UpdateArrayError::WrongOpcode(other)),
    };
    let ticks = r.read_u32()?;

    let local = if r.read_bool()? {
        r.read_bits(table.field_bits(SLOT_WEAPON))?;
        Some(LocalStats {
            health: table.get(SLOT_HEALTH).read_scalar(&mut r)?,
            energy: table.get(SLOT_ENERGY).read_scalar(&mut r)?,
        })
    } else {
        None
    };

    let count = r.read_u8()? as usize;
    let mut entities = Vec::with_capacity(count);
    for _ in 0..count {
        entities.push(decode_entity(&mut r, table)?);
    }

    Ok(DecodedUpdate {
        kind,
        ticks,
        local,
        entities,
    })
}

fn decode_entity(
    r: &mut BitReader<'_>,
    table: &TranslationTable,
) -> Result<DecodedEntity, UpdateArrayError> {
    let net_id = r.read_i32()?;
    let is_manned = r.read_bool()?;
    let mask = DirtyMask::from_bits_truncate(r.read_bits(DirtyMask::WIRE_BITS)? as u16);
    let bank_selector = r.read_bits(table.bank_selector_bits())?;

    let mut out = DecodedEntity {
        net_id,
        is_manned,
        mask,
        bank_selector,
        unit_type: None,
        team: None,
        cargo_type: None,
        position: None,
        velocity: None,
        rotation: None,
        spin: None,
        health: None,
        energy: None,
        owner: None,
    };

    if mask.contains(DirtyMask::DEFINITION) {
        let unit = r.read_bits(table.field_bits(SLOT_UNIT_TYPE))? as u32;
        let team = r.read_bits(table.field_bits(SLOT_TEAM))? as u32;
        r.read_bits(table.field_bits(SLOT_TEAM))?;
        if matches!(unit, UNIT_CARGO_CRATE | UNIT_CARGO_CARRIER) {
            out.cargo_type = Some(r.read_bits(table.field_bits(SLOT_CARGO_TYPE))? as u32);
        }
        r.read_bool()?;
        out.unit_type = Some(unit);
        out.team = Some(team);
    }

    let bank = DEFAULT_BANK;
    if mask.contains(DirtyMask::POSITION) {
        out.position = Some(table.vector(bank, VectorField::Position).read_vec3(r)?);
    }
    if mask.contains(DirtyMask::VELOCITY) {
        out.velocity = Some(table.vector(bank, VectorField::Velocity).read_vec3(r)?);
    }
    if mask.contains(DirtyMask::ROTATION) {
        out.rotation = Some(table.vector(bank, VectorField::Rotation).read_vec3(r)?);
    }
    if mask.contains(DirtyMask::SPIN) {
        out.spin = Some(table.vector(bank, VectorField::Spin).read_vec3(r)?);
    }
    if mask.contains(DirtyMask::HEALTH) {
        out.health = Some(table.get(SLOT_HEALTH).read_scalar(r)?);
    }
    if mask.contains(DirtyMask::ENERGY) {
        out.energy = Some(table.get(SLOT_ENERGY).read_scalar(r)?);
    }
    if mask.contains(DirtyMask::OWNER) {
        out.owner = Some(r.read_i32()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::FixedPriority;

    fn tank(id: u32) -> Entity {
        Entity::new(id, 5, 1, Vec3::new(80.0, 80.0, 25.0))
    }

    #[test]
    fn test_empty_body_layout() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let bytes = encoder
            .encode(UpdateKind::Delta, 0x01020304, None, &[])
            .unwrap();
        // opcode, ticks, presence bit 0 then count 0 across the byte edge
        assert_eq!(bytes, vec![0x0E, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn test_local_stats_bit_count() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let bytes = encoder
            .encode(
                UpdateKind::Delta,
                7,
                Some(LocalStats {
                    health: 1.0,
                    energy: 0.5,
                }),
                &[],
            )
            .unwrap();
        // 8 + 32 + (1 + 5 + 10 + 10) + 8 bits
        assert_eq!(bytes.len(), 10);

        let decoded = decode(&bytes, &table).unwrap();
        let local = decoded.local.unwrap();
        assert!((local.health - 1.0).abs() <= 1.0 / 1022.0);
        assert!((local.energy - 0.5).abs() <= 1.0 / 1022.0);
    }

    #[test]
    fn test_fields_follow_mask_order() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);

        let mut a = tank(3);
        a.set_energy(0.25);
        a.set_velocity(Vec3::new(1.0, 2.0, 3.0));
        a.set_position(Vec3::new(10.0, 20.0, 30.0));

        let mut b = tank(3);
        b.set_position(Vec3::new(10.0, 20.0, 30.0));
        b.set_velocity(Vec3::new(1.0, 2.0, 3.0));
        b.set_energy(0.25);

        let first = encoder
            .encode(UpdateKind::Delta, 1, None, &[UpdateEntry::pending(&a)])
            .unwrap();
        let second = encoder
            .encode(UpdateKind::Delta, 1, None, &[UpdateEntry::pending(&b)])
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_definition_block() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let entity = tank(42);

        let bytes = encoder
            .encode(
                UpdateKind::View,
                9,
                None,
                &[UpdateEntry::forced(&entity, DirtyMask::SNAPSHOT)],
            )
            .unwrap();
        let decoded = decode(&bytes, &table).unwrap();
        assert_eq!(decoded.kind, UpdateKind::View);
        assert_eq!(decoded.entities.len(), 1);

        let e = &decoded.entities[0];
        assert_eq!(e.net_id, 42);
        assert!(e.is_manned);
        assert_eq!(e.mask, DirtyMask::SNAPSHOT);
        assert_eq!(e.bank_selector, 16);
        assert_eq!(e.unit_type, Some(5));
        assert_eq!(e.team, Some(1));
        assert_eq!(e.cargo_type, None);
        let pos = e.position.unwrap();
        assert!((pos - Vec3::new(80.0, 80.0, 25.0)).abs().max_element() < 0.5);
        assert!(!entity.is_dirty());
    }

    #[test]
    fn test_cargo_units_carry_extra_field() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);

        let plain = tank(1);
        let mut cargo = Entity::new(1, UNIT_CARGO_CRATE, 1, plain.position);
        cargo.cargo_type = 7;

        let mask = DirtyMask::DEFINITION;
        let plain_bytes = encoder
            .encode(UpdateKind::Delta, 0, None, &[UpdateEntry::forced(&plain, mask)])
            .unwrap();
        let cargo_bytes = encoder
            .encode(UpdateKind::Delta, 0, None, &[UpdateEntry::forced(&cargo, mask)])
            .unwrap();
        assert_eq!(cargo_bytes.len(), plain_bytes.len() + 1);

        let decoded = decode(&cargo_bytes, &table).unwrap();
        assert_eq!(decoded.entities[0].cargo_type, Some(7));
    }

    #[test]
    fn test_weapon_and_hard_sync_emit_no_payload() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let entity = tank(1);

        let bare = encoder
            .encode(
                UpdateKind::Delta,
                0,
                None,
                &[UpdateEntry::forced(&entity, DirtyMask::OWNER)],
            )
            .unwrap();
        let flagged = encoder
            .encode(
                UpdateKind::Delta,
                0,
                None,
                &[UpdateEntry::forced(
                    &entity,
                    DirtyMask::OWNER | DirtyMask::WEAPON | DirtyMask::HARD_SYNC,
                )],
            )
            .unwrap();
        assert_eq!(bare.len(), flagged.len());

        let decoded = decode(&flagged, &table).unwrap();
        assert_eq!(decoded.entities[0].owner, Some(0));
    }

    #[test]
    fn test_count_limit() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let entities: Vec<Entity> = (1..=300).map(tank).collect();
        let entries: Vec<UpdateEntry<'_>> = entities
            .iter()
            .map(|e| UpdateEntry::forced(e, DirtyMask::POSITION))
            .collect();

        assert_eq!(
            encoder.encode(UpdateKind::View, 0, None, &entries),
            Err(UpdateArrayError::TooManyEntities(300))
        );

        let pages = encoder.encode_paginated(UpdateKind::View, 0, None, &entries);
        assert_eq!(pages.len(), 2);
        let counts: Vec<usize> = pages
            .iter()
            .map(|p| decode(p, &table).unwrap().entities.len())
            .collect();
        assert_eq!(counts, vec![255, 45]);
    }

    #[test]
    fn test_paginated_empty_without_stats_sends_nothing() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        assert!(encoder
            .encode_paginated(UpdateKind::Delta, 0, None, &[])
            .is_empty());
        let stats = Some(LocalStats {
            health: 1.0,
            energy: 1.0,
        });
        assert_eq!(
            encoder
                .encode_paginated(UpdateKind::Delta, 0, stats, &[])
                .len(),
            1
        );
    }

    #[test]
    fn test_policy_changes_vector_width() {
        let table = TranslationTable::default();
        let coarse = FixedPriority(0);
        let fine = UpdateArrayEncoder::new(&table);
        let rough = UpdateArrayEncoder::with_policy(&table, &coarse);
        let entity = tank(1);
        let entry = [UpdateEntry::forced(&entity, DirtyMask::POSITION)];

        let a = fine.encode(UpdateKind::Delta, 0, None, &entry).unwrap();
        let b = rough.encode(UpdateKind::Delta, 0, None, &entry).unwrap();
        assert!(b.len() < a.len());
        assert!(decode(&b, &table).unwrap().entities[0].position.is_some());
    }
}
