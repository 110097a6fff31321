use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};

use wulf::{EntityManager, SessionId, UpdateArrayEncoder};

use crate::server::Shared;
use crate::transport::Transport;

pub async fn run_tick_loop(shared: Arc<Shared>) {
    let tick = shared.config.tick_duration();
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shutdown = shared.subscribe_shutdown();

    loop {
        tokio::select! {
            _ = interval.tick() => tick_world(&shared, tick.as_secs_f32()),
            _ = shutdown.changed() => break,
        }
    }
}

pub fn simulate_world(world: &mut EntityManager, dt: f32) -> usize {
    world.integrate(dt)
}

/// Advances the world one step and sends each viewer the resulting delta
/// with its own vehicle's vitals. Viewers are read under the world lock, so
/// a session that joins the view sees either this tick's delta or a
/// snapshot taken after it. Dirty flags are cleared only after every
/// viewer's delta is built.
pub fn tick_world(shared: &Shared, dt: f32) {
    let batches: Vec<(SessionId, Transport, Vec<Vec<u8>>)> = {
        let mut world = shared.world();
        let viewers: Vec<(SessionId, Option<u32>, Transport)> = {
            let sessions = shared.sessions();
            sessions
                .logged_in()
                .filter(|s| s.sim.wants_updates)
                .map(|s| (s.id, s.sim.owned_entity, shared.transport_of(s)))
                .collect()
        };

        let moved = simulate_world(&mut world, dt);
        if moved > 0 {
            log::trace!("{} entities moved", moved);
        }

        let encoder = UpdateArrayEncoder::new(&shared.table);
        let ticks = shared.clock.ticks();
        let batches = viewers
            .into_iter()
            .map(|(id, vehicle, transport)| {
                let local = vehicle.and_then(|net_id| world.local_stats(net_id));
                (id, transport, world.dirty_packets(&encoder, ticks, local))
            })
            .collect();
        world.clear_all_dirty_flags();
        batches
    };

    for (id, transport, packets) in batches {
        for packet in &packets {
            if let Err(e) = transport.send(packet) {
                log::warn!("World update to session {} failed: {}", id, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_simulate_world_moves_entities() {
        let mut world = EntityManager::new();
        let id = world.create(5, 1, Vec3::ZERO, None).unwrap();
        world.clear_all_dirty_flags();
        world
            .get_mut(id)
            .unwrap()
            .set_velocity(Vec3::new(10.0, 0.0, 0.0));
        world.clear_all_dirty_flags();

        assert_eq!(simulate_world(&mut world, 0.5), 1);
        assert_eq!(world.get(id).unwrap().position, Vec3::new(5.0, 0.0, 0.0));
        assert!(world.get(id).unwrap().is_dirty());
    }
}
