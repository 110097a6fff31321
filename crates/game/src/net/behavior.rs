//! Game rules and vehicle tuning the client loads once per login, carried
//! by the behavior message (0x24).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::bitstream::BitWriter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorHeader {
    pub spawn_flag: u8,
    pub timeout: f32,
    /// Range tunables; the second scales velocities.
    pub ranges: [f32; 4],
    pub total_team_size: i32,
    pub glimpse_ms: i32,
    pub push_ms: i32,
    pub gravity: f32,
    pub switches: [i32; 2],
    pub max_pulse_charge: f32,
    pub extra: [f32; 11],
    pub flags: [u8; 2],
}

impl Default for BehaviorHeader {
    fn default() -> Self {
        Self {
            spawn_flag: 0,
            timeout: 5.0,
            ranges: [100.0; 4],
            total_team_size: 20,
            glimpse_ms: 25_000,
            push_ms: 35_000,
            gravity: 100.0,
            switches: [1, 1],
            max_pulse_charge: 1.0,
            extra: [1.0; 11],
            flags: [1, 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitDefaults {
    pub scale: f32,
    pub regen: f32,
    pub max_health: i32,
}

impl Default for UnitDefaults {
    fn default() -> Self {
        Self {
            scale: 1.0,
            regen: 100.0,
            max_health: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehiclePhysics {
    pub speed: f32,
    pub accel: f32,
    pub engine_torque: i32,
    pub suspension_stiffness: i32,
    pub ground_friction: f32,
    pub turn_rate: f32,
    pub suspension_dampening: f32,
    pub reserved: i32,
    pub mass: i32,
}

impl Default for VehiclePhysics {
    fn default() -> Self {
        Self {
            speed: 20.0,
            accel: 4.0,
            engine_torque: 700,
            suspension_stiffness: 550,
            ground_friction: 0.5,
            turn_rate: 0.2,
            suspension_dampening: 2.0,
            reserved: 0,
            mass: 33_000,
        }
    }
}

/// Handling shared by the tank and scout blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Handling {
    pub turn_adjust: f32,
    pub move_adjust: f32,
    pub strafe_adjust: f32,
    pub max_velocity: f32,
    pub low_fuel_level: f32,
    pub max_altitude: f32,
    pub gravity_pct: f32,
}

impl Default for Handling {
    fn default() -> Self {
        Self {
            turn_adjust: 4.5,
            move_adjust: 85.0,
            strafe_adjust: 69.7,
            max_velocity: 80.0,
            low_fuel_level: 2000.0,
            max_altitude: 5.0,
            gravity_pct: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub header: BehaviorHeader,
    pub weapon_units: u32,
    pub weapon_slots: u32,
    pub unit_count: u32,
    pub units: UnitDefaults,
    pub vehicle_count: u32,
    pub vehicle: VehiclePhysics,
    pub handling: Handling,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            header: BehaviorHeader::default(),
            weapon_units: 4,
            weapon_slots: 13,
            unit_count: 39,
            units: UnitDefaults::default(),
            vehicle_count: 2,
            vehicle: VehiclePhysics::default(),
            handling: Handling::default(),
        }
    }
}

struct Hardpoint {
    position: Vec3,
    normal: Vec3,
}

const THRUSTERS: [Hardpoint; 2] = [
    Hardpoint {
        position: Vec3::new(-2.0, 0.0, -0.5),
        normal: Vec3::new(0.0, 0.0, -0.75),
    },
    Hardpoint {
        position: Vec3::new(2.0, 0.0, -0.5),
        normal: Vec3::new(0.0, 0.0, -0.75),
    },
];
const THRUSTER_DEPTH: f32 = -5.0;

const SCOUT_FIXED: [f32; 5] = [38.0, 72.0, 85.0, 4.9, 3.5];
const BOMBER: [f32; 10] = [
    -2.513_274_1,
    2.356_194_5,
    80.0,
    45.0,
    0.5,
    70.0,
    110.0,
    340.0,
    1000.0,
    1800.0,
];

impl BehaviorConfig {
    /// Writes the message body, everything after the opcode.
    pub fn write(&self, w: &mut BitWriter) {
        self.write_header(w);

        for _ in 0..self.weapon_units * self.weapon_slots {
            w.write_bytes(&[0; 5]);
            w.write_fixed(1.0);
            for _ in 0..5 {
                w.write_i32(0);
            }
            for v in [100.0, 1000.0, 500.0, 1.0] {
                w.write_fixed(v);
            }
        }

        for _ in 0..self.unit_count {
            w.write_fixed(self.units.scale);
            w.write_fixed(self.units.regen);
            w.write_i32(self.units.max_health);
        }

        let v = &self.vehicle;
        for _ in 0..self.vehicle_count {
            w.write_fixed(v.speed);
            w.write_fixed(v.accel);
            w.write_i32(v.engine_torque);
            w.write_i32(v.suspension_stiffness);
            w.write_fixed(v.ground_friction);
            w.write_fixed(v.turn_rate);
            w.write_fixed(v.suspension_dampening);
            w.write_i32(v.reserved);
            w.write_i32(v.mass);
        }

        // Tank weapons, tank thrusters, scout weapons, scout thrusters.
        let blocks: [&[Hardpoint]; 4] = [&[], &THRUSTERS, &[], &THRUSTERS];
        for mounts in blocks {
            write_hardpoints(w, mounts);
        }

        self.write_handling(w);
    }

    fn write_header(&self, w: &mut BitWriter) {
        let h = &self.header;
        w.write_u8(h.spawn_flag);
        w.write_fixed(h.timeout);
        for v in h.ranges {
            w.write_fixed(v);
        }
        w.write_i32(h.total_team_size);
        w.write_i32(h.glimpse_ms);
        w.write_i32(h.push_ms);
        w.write_fixed(h.gravity);
        for v in h.switches {
            w.write_i32(v);
        }
        w.write_fixed(h.max_pulse_charge);
        for v in h.extra {
            w.write_fixed(v);
        }
        w.write_bytes(&h.flags);
    }

    /// Tank, scout and bomber blocks, each the exact length the client reads.
    fn write_handling(&self, w: &mut BitWriter) {
        let a = &self.handling;
        for v in [
            a.turn_adjust,
            a.move_adjust,
            a.strafe_adjust,
            a.max_velocity,
            a.low_fuel_level,
            a.max_altitude,
            a.gravity_pct,
        ] {
            w.write_fixed(v);
        }

        w.write_fixed(a.turn_adjust);
        w.write_fixed(a.move_adjust);
        for v in &SCOUT_FIXED[..3] {
            w.write_fixed(*v);
        }
        w.write_fixed(a.low_fuel_level);
        for v in &SCOUT_FIXED[3..] {
            w.write_fixed(*v);
        }
        w.write_fixed(a.gravity_pct);

        for v in BOMBER {
            w.write_fixed(v);
        }
        w.write_fixed(a.low_fuel_level);
    }
}

fn write_hardpoints(w: &mut BitWriter, mounts: &[Hardpoint]) {
    w.write_i32(mounts.len() as i32);
    for mount in mounts {
        w.write_vec3_fixed(mount.position);
        w.write_vec3_fixed(mount.normal);
        w.write_i32(0);
    }
    let trailer = if mounts.is_empty() { 0.0 } else { THRUSTER_DEPTH };
    w.write_fixed(trailer);
}
