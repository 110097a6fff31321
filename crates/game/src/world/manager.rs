use std::collections::HashMap;

use glam::Vec3;
use thiserror::Error;

use crate::net::packets;

use super::entity::{DirtyMask, Entity};
use super::update_array::{LocalStats, UpdateArrayEncoder, UpdateEntry, UpdateKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("net id {0} is already in use")]
    DuplicateNetId(u32),
    #[error("no entity with net id {0}")]
    NotFound(u32),
    #[error("net id space exhausted")]
    IdsExhausted,
}

/// Returned when an entity leaves the world. Every viewer needs to hear
/// about it, so dropping it unsent is a bug.
#[must_use = "entity removals must be broadcast to clients"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRemoved {
    pub net_id: u32,
    pub unit_type: u32,
}

impl EntityRemoved {
    pub fn packet(&self) -> Vec<u8> {
        packets::entity_remove(self.net_id)
    }
}

/// Sole owner of every world entity.
#[derive(Debug)]
pub struct EntityManager {
    entities: HashMap<u32, Entity>,
    next_net_id: u32,
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityManager {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_net_id: 1,
        }
    }

    /// Adds an entity and queues it for its first broadcast with its
    /// definition, position and health. An explicit `net_id` must be free.
    pub fn create(
        &mut self,
        unit_type: u32,
        team: u32,
        position: Vec3,
        net_id: Option<u32>,
    ) -> Result<u32, WorldError> {
        let id = match net_id {
            Some(id) if self.entities.contains_key(&id) || id == 0 => {
                return Err(WorldError::DuplicateNetId(id));
            }
            Some(id) => id,
            None => self.allocate_id()?,
        };

        let mut entity = Entity::new(id, unit_type, team, position);
        entity.mark_dirty(DirtyMask::DEFINITION | DirtyMask::HEALTH | DirtyMask::POSITION);
        self.entities.insert(id, entity);
        log::debug!("Entity {} created (unit {}, team {})", id, unit_type, team);
        Ok(id)
    }

    fn allocate_id(&mut self) -> Result<u32, WorldError> {
        for _ in 0..=self.entities.len() {
            let id = self.next_net_id;
            self.next_net_id = self.next_net_id.checked_add(1).unwrap_or(1);
            if id != 0 && !self.entities.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(WorldError::IdsExhausted)
    }

    pub fn remove(&mut self, net_id: u32) -> Option<EntityRemoved> {
        let entity = self.entities.remove(&net_id)?;
        log::debug!("Entity {} removed", net_id);
        Some(EntityRemoved {
            net_id,
            unit_type: entity.unit_type,
        })
    }

    /// Empties the world, returning a removal for every entity.
    pub fn clear(&mut self) -> Vec<EntityRemoved> {
        let mut ids: Vec<u32> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn get(&self, net_id: u32) -> Option<&Entity> {
        self.entities.get(&net_id)
    }

    pub fn get_mut(&mut self, net_id: u32) -> Option<&mut Entity> {
        self.entities.get_mut(&net_id)
    }

    /// All entities ordered by net id.
    pub fn get_all(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by_key(|e| e.net_id());
        all
    }

    pub fn get_dirty_entities(&self) -> Vec<&Entity> {
        let mut dirty: Vec<&Entity> = self.entities.values().filter(|e| e.is_dirty()).collect();
        dirty.sort_by_key(|e| e.net_id());
        dirty
    }

    pub fn clear_all_dirty_flags(&mut self) {
        for entity in self.entities.values_mut() {
            entity.clear_dirty();
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Moves every entity by its velocity and spin. Returns how many moved.
    pub fn integrate(&mut self, dt: f32) -> usize {
        self.entities
            .values_mut()
            .map(|e| e.integrate(dt))
            .filter(|&moved| moved)
            .count()
    }

    /// Full world view for a joining client. Definition, position and
    /// health are forced on a copy of each mask.
    pub fn snapshot_packets(
        &self,
        encoder: &UpdateArrayEncoder<'_>,
        ticks: u32,
        local: Option<LocalStats>,
    ) -> Vec<Vec<u8>> {
        let entries: Vec<UpdateEntry<'_>> = self
            .get_all()
            .into_iter()
            .map(|e| UpdateEntry::forced(e, DirtyMask::SNAPSHOT))
            .collect();
        encoder.encode_paginated(UpdateKind::View, ticks, local, &entries)
    }

    /// Delta of everything dirty. Flags stay set so each viewer can get its
    /// own copy; call [`clear_all_dirty_flags`](Self::clear_all_dirty_flags)
    /// once the whole batch is out.
    pub fn dirty_packets(
        &self,
        encoder: &UpdateArrayEncoder<'_>,
        ticks: u32,
        local: Option<LocalStats>,
    ) -> Vec<Vec<u8>> {
        let entries: Vec<UpdateEntry<'_>> = self
            .get_dirty_entities()
            .into_iter()
            .map(UpdateEntry::pending)
            .collect();
        encoder.encode_paginated(UpdateKind::Delta, ticks, local, &entries)
    }

    /// HUD vitals of one entity, typically a player's vehicle.
    pub fn local_stats(&self, net_id: u32) -> Option<LocalStats> {
        self.get(net_id).map(|e| LocalStats {
            health: e.health,
            energy: e.energy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TranslationTable;
    use crate::world::update_array::decode;

    #[test]
    fn test_create_assigns_sequential_ids() {
        let mut world = EntityManager::new();
        let a = world.create(5, 1, Vec3::ZERO, None).unwrap();
        let b = world.create(5, 2, Vec3::ZERO, None).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_create_marks_spawn_fields() {
        let mut world = EntityManager::new();
        let id = world.create(5, 1, Vec3::new(80.0, 80.0, 25.0), None).unwrap();
        let entity = world.get(id).unwrap();
        assert_eq!(
            entity.pending_mask(),
            DirtyMask::DEFINITION | DirtyMask::HEALTH | DirtyMask::POSITION
        );
        assert_eq!(entity.health, 1.0);
    }

    #[test]
    fn test_override_id() {
        let mut world = EntityManager::new();
        assert_eq!(world.create(1, 1, Vec3::ZERO, Some(1001)), Ok(1001));
        assert_eq!(
            world.create(1, 1, Vec3::ZERO, Some(1001)),
            Err(WorldError::DuplicateNetId(1001))
        );
    }

    #[test]
    fn test_auto_ids_skip_taken() {
        let mut world = EntityManager::new();
        world.create(1, 1, Vec3::ZERO, Some(2)).unwrap();
        assert_eq!(world.create(1, 1, Vec3::ZERO, None), Ok(1));
        assert_eq!(world.create(1, 1, Vec3::ZERO, None), Ok(3));
    }

    #[test]
    fn test_remove_reports_once() {
        let mut world = EntityManager::new();
        let id = world.create(5, 1, Vec3::ZERO, None).unwrap();
        let removed = world.remove(id).unwrap();
        assert_eq!(removed.net_id, id);
        assert_eq!(removed.packet(), vec![0x19, 0, 0, 0, 1]);
        assert!(world.remove(id).is_none());
    }

    #[test]
    fn test_dirty_cycle() {
        let mut world = EntityManager::new();
        let id = world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.get_mut(id).unwrap().mark_dirty(DirtyMask::ENERGY);
        world.clear_all_dirty_flags();
        assert!(world.get_dirty_entities().is_empty());
    }

    #[test]
    fn test_snapshot_leaves_pending_masks() {
        let table = TranslationTable::default();
        let encoder = UpdateArrayEncoder::new(&table);
        let mut world = EntityManager::new();
        let a = world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.create(5, 2, Vec3::ZERO, None).unwrap();
        world.clear_all_dirty_flags();
        world.get_mut(a).unwrap().set_energy(0.4);

        let pages = world.snapshot_packets(&encoder, 0, None);
        assert_eq!(pages.len(), 1);
        let view = decode(&pages[0], &table).unwrap();
        assert_eq!(view.entities.len(), 2);
        assert!(view.entities[0].mask.contains(DirtyMask::SNAPSHOT | DirtyMask::ENERGY));

        assert_eq!(world.get(a).unwrap().pending_mask(), DirtyMask::ENERGY);
        assert_eq!(world.get_dirty_entities().len(), 1);
    }

    #[test]
    fn test_integrate_counts_movers() {
        let mut world = EntityManager::new();
        let a = world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.clear_all_dirty_flags();
        world.get_mut(a).unwrap().velocity = Vec3::X;
        assert_eq!(world.integrate(0.2), 1);
        assert_eq!(world.get_dirty_entities().len(), 1);
    }

    #[test]
    fn test_clear_returns_all_removals() {
        let mut world = EntityManager::new();
        world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.create(5, 1, Vec3::ZERO, None).unwrap();
        let removed = world.clear();
        assert_eq!(removed.len(), 2);
        assert!(world.is_empty());
    }
}
