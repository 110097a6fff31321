use glam::Vec3;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Fields of an entity changed since it was last serialized. Bit order
    /// is also the wire emission order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DirtyMask: u16 {
        const DEFINITION = 1 << 0;
        const POSITION = 1 << 1;
        const VELOCITY = 1 << 2;
        const ROTATION = 1 << 3;
        const SPIN = 1 << 4;
        const HEALTH = 1 << 5;
        const WEAPON = 1 << 6;
        const ENERGY = 1 << 7;
        const OWNER = 1 << 8;
        const HARD_SYNC = 1 << 9;
    }
}

impl DirtyMask {
    pub const WIRE_BITS: u32 = 10;

    /// Forced on every entity in a world-join snapshot.
    pub const SNAPSHOT: Self = Self::DEFINITION
        .union(Self::POSITION)
        .union(Self::HEALTH);
}

/// Unit types with a carried-unit field in their definition block.
pub const UNIT_CARGO_CRATE: u32 = 19;
pub const UNIT_CARGO_CARRIER: u32 = 37;

#[derive(Debug, Clone)]
pub struct Entity {
    net_id: u32,
    pub unit_type: u32,
    pub team: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Vec3,
    pub spin: Vec3,
    pub health: f32,
    pub energy: f32,
    pub is_manned: bool,
    pub owner: i32,
    /// Unit type packed inside a crate or carrier. Only sent for those units.
    pub cargo_type: u32,
    pending: DirtyMask,
}

impl Entity {
    pub(crate) fn new(net_id: u32, unit_type: u32, team: u32, position: Vec3) -> Self {
        Self {
            net_id,
            unit_type,
            team,
            position,
            velocity: Vec3::ZERO,
            rotation: Vec3::ZERO,
            spin: Vec3::ZERO,
            health: 1.0,
            energy: 1.0,
            is_manned: true,
            owner: 0,
            cargo_type: 0,
            pending: DirtyMask::empty(),
        }
    }

    pub fn net_id(&self) -> u32 {
        self.net_id
    }

    pub fn pending_mask(&self) -> DirtyMask {
        self.pending
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn mark_dirty(&mut self, bits: DirtyMask) {
        self.pending |= bits;
    }

    pub fn clear_dirty(&mut self) {
        self.pending = DirtyMask::empty();
    }

    pub fn carries_cargo_field(&self) -> bool {
        matches!(self.unit_type, UNIT_CARGO_CRATE | UNIT_CARGO_CARRIER)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.mark_dirty(DirtyMask::POSITION);
    }

    /// Moves without interpolation on the client.
    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
        self.mark_dirty(DirtyMask::POSITION | DirtyMask::HARD_SYNC);
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.mark_dirty(DirtyMask::VELOCITY);
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.mark_dirty(DirtyMask::ROTATION);
    }

    pub fn set_spin(&mut self, spin: Vec3) {
        self.spin = spin;
        self.mark_dirty(DirtyMask::SPIN);
    }

    pub fn set_health(&mut self, health: f32) {
        self.health = health;
        self.mark_dirty(DirtyMask::HEALTH);
    }

    pub fn set_energy(&mut self, energy: f32) {
        self.energy = energy;
        self.mark_dirty(DirtyMask::ENERGY);
    }

    pub fn set_owner(&mut self, owner: i32) {
        self.owner = owner;
        self.mark_dirty(DirtyMask::OWNER);
    }

    pub fn set_team(&mut self, team: u32) {
        self.team = team;
        self.mark_dirty(DirtyMask::DEFINITION);
    }

    /// Advances position and rotation by one step of velocity and spin.
    /// Returns true when anything moved.
    pub fn integrate(&mut self, dt: f32) -> bool {
        let mut moved = false;
        if self.velocity != Vec3::ZERO {
            self.position += self.velocity * dt;
            self.mark_dirty(DirtyMask::POSITION);
            moved = true;
        }
        if self.spin != Vec3::ZERO {
            self.rotation += self.spin * dt;
            self.mark_dirty(DirtyMask::ROTATION);
            moved = true;
        }
        moved
    }
}
