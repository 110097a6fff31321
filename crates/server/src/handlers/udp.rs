use std::net::SocketAddr;
use std::sync::Arc;

use glam::Vec3;

use wulf::net::packets::{
    self, CommMessage, GAME_DATA_STREAM, RELIABLE_STREAM, TankSpawn, TankVitals, comm,
};
use wulf::net::requests::{
    Ack2, BeaconRequest, BpsRequest, ChatRequest, KeyEcho, ReincarnateKind, ReincarnateRequest,
    StreamHandshake, Timestamp, parse_debug_string,
};
use wulf::net::{SequencedHeader, build_ack, opcode, reincarnate};
use wulf::{ClaimOutcome, PacketError, SessionId};

use super::tcp::record_pong;
use crate::commands::CommandContext;
use crate::server::Shared;

/// One received UDP payload and whatever session its address is bound to.
#[derive(Debug)]
pub struct UdpContext {
    pub shared: Arc<Shared>,
    pub addr: SocketAddr,
    pub session: Option<SessionId>,
}

impl UdpContext {
    /// Replies to the sender's address, bound or not.
    fn reply(&self, payload: &[u8]) {
        self.shared.send_udp(self.addr, payload);
    }

    /// Gameplay requests are only trusted from a bound address.
    fn bound_session(&self, op: u8) -> Option<SessionId> {
        if self.session.is_none() {
            log::warn!(
                "Dropping 0x{:02X} from unbound endpoint {}",
                op,
                self.addr
            );
        }
        self.session
    }

    fn ack(&self, header: &SequencedHeader) {
        let seq = self.shared.sessions().next_outgoing_seq(self.addr);
        self.reply(&build_ack(seq, header.opcode, header.seq));
    }

    fn player_id(&self, session: SessionId) -> u32 {
        self.shared
            .sessions()
            .get(session)
            .and_then(|s| s.player_id())
            .unwrap_or_default()
    }
}

pub fn on_key_echo(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let echo = KeyEcho::parse(payload, ctx.shared.config.read_mode)?;
    let claimed = ctx.shared.sessions().claim_key(ctx.addr, &echo.key);
    match claimed {
        Ok(ClaimOutcome::Bound(id)) => {
            log::info!("Session {} bound to UDP {}", id, ctx.addr);
            ctx.session = Some(id);
            ctx.reply(&packets::identified_udp());
            let signal = ctx
                .shared
                .sessions()
                .get(id)
                .map(|s| Arc::clone(&s.link.key_echoed));
            if let Some(signal) = signal {
                signal.notify_one();
            }
        }
        Ok(ClaimOutcome::AlreadyBound(id)) => {
            log::debug!("Session {} re-sent its key from {}", id, ctx.addr);
            ctx.reply(&packets::identified_udp());
        }
        Err(e) => log::warn!("Key echo from {} rejected: {}", ctx.addr, e),
    }
    Ok(())
}

pub fn on_probe(ctx: &mut UdpContext, _payload: &[u8]) -> Result<(), PacketError> {
    log::debug!("UDP probe from {}", ctx.addr);
    Ok(())
}

/// Answers the client's stream handshake with the stream layout and the
/// starting sequence of the reliable and game-data streams.
pub fn on_stream_handshake(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let handshake = StreamHandshake::parse(payload)?;
    log::debug!(
        "Stream handshake from {} (connection {}, {} streams)",
        ctx.addr,
        handshake.connection_id,
        handshake.stream_count
    );
    let ticks = ctx.shared.clock.ticks();
    let player_id = ctx.session.map(|id| ctx.player_id(id)).unwrap_or_default();
    ctx.reply(&packets::handshake_ack(ticks));
    ctx.reply(&packets::stream_definitions(ticks, player_id));
    ctx.reply(&packets::stream_set_start(RELIABLE_STREAM, 1));
    ctx.reply(&packets::stream_set_start(GAME_DATA_STREAM, 1));
    Ok(())
}

pub fn on_client_ping(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let Timestamp(echo) = Timestamp::parse(payload)?;
    ctx.reply(&packets::ping_reply(echo));
    Ok(())
}

pub fn on_pong(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let Timestamp(sent) = Timestamp::parse(payload)?;
    if let Some(session) = ctx.session {
        record_pong(&ctx.shared, session, sent);
    }
    Ok(())
}

pub fn on_ack(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    log::trace!("Client ACK from {} ({} bytes)", ctx.addr, payload.len());
    Ok(())
}

pub fn on_debug_string(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let text = parse_debug_string(payload)?;
    log::debug!("Client debug from {}: {}", ctx.addr, text);
    Ok(())
}

pub fn on_keep_alive(ctx: &mut UdpContext, _payload: &[u8]) -> Result<(), PacketError> {
    log::trace!("Keep-alive from {}", ctx.addr);
    Ok(())
}

pub fn on_bps_request(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let request = BpsRequest::parse(payload)?;
    log::debug!("{} asked for {} B/s", ctx.addr, request.rate);
    ctx.reply(&packets::bps_reply(request.rate));
    Ok(())
}

pub fn on_chat(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let Some(session) = ctx.bound_session(opcode::CHAT) else {
        return Ok(());
    };
    let chat = ChatRequest::parse(payload, ctx.shared.config.read_mode)?;
    ctx.ack(&chat.header);

    let player_id = ctx.player_id(session);
    log::info!("Chat from player {} (scope {}): {}", player_id, chat.scope, chat.text);

    if chat.scope as i16 == comm::SCOPE_COMMAND {
        let command = CommandContext {
            shared: &ctx.shared,
            session,
            player_id,
        };
        if !ctx.shared.commands.process(&command, &chat.text) {
            ctx.shared.system_message(session, "Unknown command.");
        }
        return Ok(());
    }

    let message = CommMessage {
        kind: comm::KIND_CHAT,
        source_player: player_id,
        scope: chat.scope as i16,
        recipient: 0,
        text: chat.text,
    };
    ctx.shared.broadcast(&packets::comm_message(&message), None);
    Ok(())
}

pub fn on_reincarnate(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    let Some(session) = ctx.bound_session(opcode::REINCARNATE) else {
        return Ok(());
    };
    let request = ReincarnateRequest::parse(payload, ctx.shared.config.read_mode)?;
    ctx.ack(&request.header);

    match request.kind {
        ReincarnateKind::Spawn { pad, .. } => {
            let pad_position = ctx.shared.world().get(pad).map(|e| e.position);
            let Some(position) = pad_position else {
                log::debug!("Session {} picked missing spawn pad {}", session, pad);
                ctx.shared
                    .system_message(session, "Can't find selected spawn point.");
                ctx.shared
                    .send_to(session, &packets::reincarnate_status(reincarnate::NOT_READY, ""));
                return Ok(());
            };
            spawn_vehicle(&ctx.shared, session, request.unit_type as u32, position);
        }
        ReincarnateKind::TeamSwitch { team } => switch_team(&ctx.shared, session, team),
    }
    Ok(())
}

fn switch_team(shared: &Shared, session: SessionId, team: i32) {
    if !matches!(team, 1 | 2) {
        shared.system_message(session, &format!("Team {} does not exist.", team));
        return;
    }

    let (player_id, vehicle) = {
        let mut sessions = shared.sessions();
        let Some(record) = sessions.get_mut(session) else {
            return;
        };
        record.sim.team = team as u32;
        (record.player_id().unwrap_or_default(), record.sim.owned_entity)
    };
    if let Some(id) = vehicle
        && let Some(entity) = shared.world().get_mut(id)
    {
        entity.set_team(team as u32);
    }

    log::info!("Player {} switched to team {}", player_id, team);
    shared.send_to(session, &packets::update_stats(player_id, team as i16));
    shared.send_to(
        session,
        &packets::reincarnate_status(reincarnate::TEAM_SWITCHED, ""),
    );
}

/// Replaces the session's vehicle with a fresh one at `position`. The
/// vehicle shares the player's id and reaches other viewers with the next
/// world tick.
pub fn spawn_vehicle(
    shared: &Shared,
    session: SessionId,
    unit_type: u32,
    position: Vec3,
) -> Option<u32> {
    let (player_id, team, previous) = {
        let sessions = shared.sessions();
        let record = sessions.get(session)?;
        (record.player_id()?, record.sim.team, record.sim.owned_entity)
    };

    // The old vehicle's removal must reach clients before any tick can
    // describe its replacement, which reuses the same net id.
    let created = {
        let mut world = shared.world();
        if let Some(removed) = previous.and_then(|id| world.remove(id)) {
            shared.broadcast_removals(&[removed]);
        }
        let created = world.create(unit_type, team, position, Some(player_id));
        if let Ok(id) = created
            && let Some(vehicle) = world.get_mut(id)
        {
            vehicle.is_manned = true;
            vehicle.set_owner(player_id as i32);
        }
        created
    };

    let net_id = match created {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Vehicle for player {} not created: {}", player_id, e);
            shared.system_message(session, "Can't spawn right now.");
            return None;
        }
    };
    if let Some(record) = shared.sessions().get_mut(session) {
        record.sim.owned_entity = Some(net_id);
    }

    let spawn = TankSpawn {
        ticks: shared.clock.ticks(),
        unit_type: unit_type as i32,
        net_id,
        flags: 0,
        position,
        velocity: Vec3::ZERO,
        vitals: Some(TankVitals {
            weapon_id: 0,
            health: 1.0,
            energy: 1.0,
        }),
    };
    shared.send_to(session, &packets::entity_spawn(&spawn, &shared.table));
    shared.system_message(session, "Spawning Local Player...");
    log::info!(
        "Player {} spawned unit {} at {:?}",
        player_id,
        unit_type,
        position
    );
    Some(net_id)
}

pub fn on_viewpoint(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    if ctx.bound_session(opcode::VIEWPOINT).is_none() {
        return Ok(());
    }
    let header = SequencedHeader::parse(payload)?;
    ctx.ack(&header);
    Ok(())
}

pub fn on_beacon(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    if ctx.bound_session(opcode::BEACON).is_none() {
        return Ok(());
    }
    let beacon = BeaconRequest::parse(payload)?;
    ctx.ack(&beacon.header);
    log::debug!("Beacon request for {} from {}", beacon.target, ctx.addr);
    Ok(())
}

pub fn on_ack2(ctx: &mut UdpContext, payload: &[u8]) -> Result<(), PacketError> {
    if ctx.bound_session(opcode::ACK2).is_none() {
        return Ok(());
    }
    let ack2 = Ack2::parse(payload)?;
    ctx.ack(&ack2.header);
    log::debug!("Translation table confirmed by {} (status {})", ctx.addr, ack2.status);
    Ok(())
}
