//! Slash commands typed into chat with the command scope.

use std::collections::HashMap;
use std::fmt;

use glam::Vec3;
use thiserror::Error;

use wulf::net::packets;
use wulf::net::rand_u64;
use wulf::{EntityManager, SessionId, WorldError};

use crate::handlers::spawn_vehicle;
use crate::server::Shared;

/// Where `spawn` with no argument drops the player's own vehicle.
const PLAYER_SPAWN: Vec3 = Vec3::new(100.0, 100.0, 100.0);
const ENTITY_SPAWN_BASE: Vec3 = Vec3::new(80.0, 80.0, 25.0);

pub struct CommandContext<'a> {
    pub shared: &'a Shared,
    pub session: SessionId,
    pub player_id: u32,
}

impl CommandContext<'_> {
    fn reply(&self, text: &str) {
        self.shared.system_message(self.session, text);
    }

    fn owned_entity(&self) -> Option<u32> {
        self.shared
            .sessions()
            .get(self.session)
            .and_then(|s| s.sim.owned_entity)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid Number.")]
    InvalidNumber,
    #[error("Usage: {0}")]
    Usage(&'static str),
}

type CommandFn = fn(&CommandContext<'_>, &[&str]) -> Result<(), CommandError>;

struct Command {
    run: CommandFn,
    usage: &'static str,
}

/// Name to command table, built once at startup and read-only afterwards.
pub struct CommandTable {
    commands: HashMap<&'static str, Command>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.commands.keys().collect();
        names.sort_unstable();
        f.debug_struct("CommandTable").field("commands", &names).finish()
    }
}

impl CommandTable {
    pub fn build() -> Self {
        let mut table = Self {
            commands: HashMap::new(),
        };
        table.register("spawn", "spawn [unit type] [cargo type]", cmd_spawn);
        table.register("list", "list", cmd_list);
        table.register("remove", "remove <net id>", cmd_remove);
        table.register("die", "die", cmd_die);
        table.register("reset", "reset", cmd_reset);
        table.register("help", "help", cmd_help);
        table
    }

    fn register(&mut self, name: &'static str, usage: &'static str, run: CommandFn) {
        self.commands.insert(name, Command { run, usage });
    }

    /// Runs the command named by the first word of `line`. Returns false
    /// when no such command exists; failures are reported to the player.
    pub fn process(&self, ctx: &CommandContext<'_>, line: &str) -> bool {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        let Some(command) = self.commands.get(name.as_str()) else {
            return false;
        };

        let args: Vec<&str> = words.collect();
        log::debug!("Player {} ran /{} {:?}", ctx.player_id, name, args);
        if let Err(e) = (command.run)(ctx, &args) {
            ctx.reply(&e.to_string());
        }
        true
    }

    fn usages(&self) -> Vec<&'static str> {
        let mut usages: Vec<_> = self.commands.values().map(|c| c.usage).collect();
        usages.sort_unstable();
        usages
    }
}

fn parse_number(arg: &str) -> Result<u32, CommandError> {
    arg.parse().map_err(|_| CommandError::InvalidNumber)
}

/// Offset in `[min, max)` drawn from the shared random source.
fn jitter(min: f32, max: f32) -> f32 {
    let unit = (rand_u64() % 10_000) as f32 / 10_000.0;
    min + unit * (max - min)
}

fn cmd_spawn(ctx: &CommandContext<'_>, args: &[&str]) -> Result<(), CommandError> {
    let Some(arg) = args.first() else {
        spawn_vehicle(ctx.shared, ctx.session, 0, PLAYER_SPAWN);
        return Ok(());
    };
    let unit_type = parse_number(arg)?;
    let cargo = args.get(1).map(|arg| parse_number(arg)).transpose()?;

    let team = ctx
        .shared
        .sessions()
        .get(ctx.session)
        .map(|s| s.sim.team)
        .unwrap_or_default();
    let spread = jitter(45.0, 85.0);
    let position = ENTITY_SPAWN_BASE + Vec3::new(spread, spread, jitter(0.0, 10.0));

    let created = create_entity(&mut ctx.shared.world(), unit_type, team, position, cargo);
    match created {
        Ok(net_id) => ctx.reply(&format!("Spawned Entity #{} (Type {})", net_id, unit_type)),
        Err(e) => {
            log::warn!("Spawn of unit {} failed: {}", unit_type, e);
            ctx.reply("Command execution failed.");
        }
    }
    Ok(())
}

/// Creates a free-standing entity. `cargo` is the unit packed inside a
/// crate or carrier; other unit types ignore it on the wire.
fn create_entity(
    world: &mut EntityManager,
    unit_type: u32,
    team: u32,
    position: Vec3,
    cargo: Option<u32>,
) -> Result<u32, WorldError> {
    let net_id = world.create(unit_type, team, position, None)?;
    if let Some(cargo) = cargo
        && let Some(entity) = world.get_mut(net_id)
    {
        entity.cargo_type = cargo;
    }
    Ok(net_id)
}

fn cmd_list(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), CommandError> {
    let lines: Vec<String> = ctx
        .shared
        .world()
        .get_all()
        .into_iter()
        .map(|e| {
            format!(
                "[ID:{}] Type:{} | Pos: {:.1}, {:.1}, {:.1}",
                e.net_id(),
                e.unit_type,
                e.position.x,
                e.position.y,
                e.position.z
            )
        })
        .collect();

    ctx.reply(&format!("--- Entity List ({}) ---", lines.len()));
    if lines.is_empty() {
        ctx.reply("No entities found.");
    }
    for line in &lines {
        ctx.reply(line);
    }
    Ok(())
}

fn cmd_remove(ctx: &CommandContext<'_>, args: &[&str]) -> Result<(), CommandError> {
    let Some(arg) = args.first() else {
        return Err(CommandError::Usage("remove <net id>"));
    };
    let net_id = parse_number(arg)?;

    if !ctx.shared.remove_entity(net_id) {
        ctx.reply(&format!("Entity #{} not found.", net_id));
        return Ok(());
    }
    for record in ctx.shared.sessions().iter_mut() {
        if record.sim.owned_entity == Some(net_id) {
            record.sim.owned_entity = None;
        }
    }
    ctx.reply(&format!("Removed Entity #{}", net_id));
    Ok(())
}

fn cmd_die(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), CommandError> {
    if let Some(vehicle) = ctx.owned_entity() {
        ctx.shared.remove_entity(vehicle);
        if let Some(record) = ctx.shared.sessions().get_mut(ctx.session) {
            record.sim.owned_entity = None;
        }
    }
    ctx.shared
        .send_to(ctx.session, &packets::death_notice(ctx.player_id));
    ctx.reply("You died.");
    Ok(())
}

fn cmd_reset(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), CommandError> {
    ctx.shared.send_to(ctx.session, &packets::reset_game());
    ctx.reply("Resetting game...");
    Ok(())
}

fn cmd_help(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), CommandError> {
    ctx.reply("Commands:");
    for usage in ctx.shared.commands.usages() {
        ctx.reply(&format!("  /s {}", usage));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wulf::world::update_array::decode;

    #[test]
    fn test_table_lists_every_command() {
        let table = CommandTable::build();
        assert_eq!(
            table.usages(),
            vec![
                "die",
                "help",
                "list",
                "remove <net id>",
                "reset",
                "spawn [unit type] [cargo type]"
            ]
        );
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..100 {
            let v = jitter(45.0, 85.0);
            assert!((45.0..85.0).contains(&v));
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("37").unwrap(), 37);
        assert!(matches!(parse_number("tank"), Err(CommandError::InvalidNumber)));
    }

    #[test]
    fn test_spawned_crate_carries_cargo() {
        let mut world = EntityManager::new();
        let id = create_entity(
            &mut world,
            wulf::world::UNIT_CARGO_CRATE,
            1,
            ENTITY_SPAWN_BASE,
            Some(7),
        )
        .unwrap();

        let table = wulf::TranslationTable::default();
        let encoder = wulf::UpdateArrayEncoder::new(&table);
        let pages = world.dirty_packets(&encoder, 0, None);
        let update = decode(&pages[0], &table).unwrap();
        let entity = update
            .entities
            .iter()
            .find(|e| e.net_id == id as i32)
            .unwrap();
        assert_eq!(entity.cargo_type, Some(7));
    }
}
