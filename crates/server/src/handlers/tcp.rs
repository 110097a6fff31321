use std::sync::Arc;

use wulf::net::packets;
use wulf::net::requests::{BpsRequest, HelloRequest, LoginRequest, Timestamp};
use wulf::net::{HelloSubCommand, login_status};
use wulf::{PacketError, SessionId, SessionPhase, UpdateArrayEncoder};

use super::{roster_entry, send_system_tcp, send_tcp};
use crate::server::Shared;
use crate::transport::TcpOutbox;

const WELCOME: &str = "Server: Welcome to Wulfram on Wulf-Forge!";
const SPAWN_HINT: &str = "To spawn in type /s spawn";

/// State owned by one connection task.
#[derive(Debug)]
pub struct TcpContext {
    pub shared: Arc<Shared>,
    pub session: SessionId,
    pub outbox: TcpOutbox,
    pub phase: SessionPhase,
}

impl TcpContext {
    pub fn new(shared: Arc<Shared>, session: SessionId, outbox: TcpOutbox) -> Self {
        Self {
            shared,
            session,
            outbox,
            phase: SessionPhase::default(),
        }
    }

    pub fn send(&self, payload: &[u8]) {
        send_tcp(&self.outbox, payload);
    }

    fn advance(&mut self, to: SessionPhase) -> bool {
        match self.phase.advance(to) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Session {}: {}", self.session, e);
                false
            }
        }
    }

    /// Sends the UDP endpoint and the session key, leaving the session
    /// waiting for the key echo.
    pub fn begin_key_exchange(&mut self, udp_port: u16) {
        let key = self
            .shared
            .sessions()
            .get(self.session)
            .map(|s| s.key.clone());
        let Some(key) = key else {
            return;
        };

        self.send(&packets::hello_udp_config(
            udp_port,
            &self.shared.config.server_ip,
        ));
        self.advance(SessionPhase::UdpConfigSent);
        self.send(&packets::hello_session_key(key.as_str()));
        self.advance(SessionPhase::KeyExchangeWait);
    }

    /// Finishes the key exchange, whether the echo arrived or not.
    pub fn key_exchange_done(&mut self, echoed: bool) {
        if self.phase != SessionPhase::KeyExchangeWait {
            return;
        }
        if !echoed {
            log::warn!(
                "Session {}: no UDP key echo within {:?}, falling back to TCP",
                self.session,
                self.shared.config.key_wait
            );
            if let Some(record) = self.shared.sessions().get_mut(self.session) {
                record.binding.degrade();
            }
            self.send(&packets::identified_udp());
        }
        self.send(&packets::hello_verified());
        self.advance(SessionPhase::LoginUsernameWait);
    }
}

pub fn on_hello(ctx: &mut TcpContext, payload: &[u8]) -> Result<(), PacketError> {
    let hello = HelloRequest::parse(payload)?;
    match hello.sub {
        HelloSubCommand::SessionKey => {
            let key = ctx
                .shared
                .sessions()
                .get(ctx.session)
                .map(|s| s.key.clone());
            if let Some(key) = key {
                log::debug!("Session {} asked for its key again", ctx.session);
                ctx.send(&packets::hello_session_key(key.as_str()));
            }
        }
        other => log::debug!("Session {} hello {:?}", ctx.session, other),
    }
    Ok(())
}

pub fn on_login(ctx: &mut TcpContext, payload: &[u8]) -> Result<(), PacketError> {
    let login = LoginRequest::parse(payload, ctx.shared.config.read_mode)?;
    match ctx.phase {
        SessionPhase::LoginUsernameWait => {
            log::info!("Session {} logging in as '{}'", ctx.session, login.text);
            if let Some(record) = ctx.shared.sessions().get_mut(ctx.session) {
                record.identity.name = login.text;
            }
            let donor = ctx.shared.config.donor;
            ctx.send(&packets::login_status(login_status::REQUEST_PASSWORD, donor));
            ctx.advance(SessionPhase::LoginPasswordWait);
        }
        SessionPhase::LoginPasswordWait => {
            if ctx.advance(SessionPhase::LoggedIn) {
                complete_login(ctx);
            }
        }
        phase => log::warn!(
            "Session {} sent login round in phase {}, ignored",
            ctx.session,
            phase
        ),
    }
    Ok(())
}

/// Everything a freshly logged-in client needs, in the order the client
/// expects it. Team and roster data go out before the world stats.
pub fn complete_login(ctx: &mut TcpContext) {
    let shared = Arc::clone(&ctx.shared);
    let assigned = shared.sessions().assign_player_id(ctx.session);
    let player_id = match assigned {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Session {}: {}", ctx.session, e);
            return;
        }
    };
    let is_guest = shared
        .sessions()
        .get(ctx.session)
        .is_some_and(|s| s.identity.is_guest);

    ctx.send(&packets::team_info(&packets::default_teams()));
    ctx.send(&packets::login_status(login_status::LOGGED_IN, shared.config.donor));
    ctx.send(&packets::player_info(player_id, is_guest));
    ctx.send(&packets::game_clock(shared.clock.ticks()));
    ctx.send(&packets::motd(&shared.config.motd));
    ctx.send(&packets::behavior(&shared.config.behavior));
    ctx.send(&packets::translation(&shared.table));

    let own = roster_entry(&shared, ctx.session);
    if let Some(own) = &own {
        ctx.send(&packets::add_to_roster(own));
    }

    let others: Vec<SessionId> = shared
        .sessions()
        .logged_in()
        .map(|s| s.id)
        .filter(|&id| id != ctx.session)
        .collect();
    for id in others {
        if let Some(entry) = roster_entry(&shared, id) {
            ctx.send(&packets::add_to_roster(&entry));
        }
    }
    if let Some(own) = &own {
        shared.broadcast(&packets::add_to_roster(own), Some(ctx.session));
    }

    ctx.send(&packets::world_stats(&shared.config.map_name));
    log::info!(
        "Session {} logged in as player {} ({} online)",
        ctx.session,
        player_id,
        shared.sessions().logged_in().count()
    );
}

pub fn on_want_updates(ctx: &mut TcpContext, _payload: &[u8]) -> Result<(), PacketError> {
    if let Err(e) = ctx.phase.require(SessionPhase::LoggedIn) {
        log::warn!("Session {} asked for updates early: {}", ctx.session, e);
        return Ok(());
    }
    let shared = Arc::clone(&ctx.shared);
    let Some(player_id) = shared
        .sessions()
        .get(ctx.session)
        .map(|record| record.player_id().unwrap_or_default())
    else {
        return Ok(());
    };

    for text in [WELCOME, SPAWN_HINT] {
        send_system_tcp(&ctx.outbox, player_id, text);
    }

    let pages = join_world_view(&shared, ctx.session, &ctx.outbox);
    log::debug!(
        "Session {} joined the world view ({} pages)",
        ctx.session,
        pages
    );
    if ctx.phase == SessionPhase::LoggedIn {
        ctx.advance(SessionPhase::Active);
    }
    Ok(())
}

/// Sends the full world snapshot and marks the session as a viewer inside
/// one world critical section. Returns the pages sent.
pub fn join_world_view(shared: &Shared, session: SessionId, outbox: &TcpOutbox) -> usize {
    let world = shared.world();
    let owned = {
        let mut sessions = shared.sessions();
        let Some(record) = sessions.get_mut(session) else {
            return 0;
        };
        record.sim.wants_updates = true;
        record.sim.owned_entity
    };

    let encoder = UpdateArrayEncoder::new(&shared.table);
    let local = owned.and_then(|id| world.local_stats(id));
    let pages = world.snapshot_packets(&encoder, shared.clock.ticks(), local);
    for page in &pages {
        send_tcp(outbox, page);
    }
    pages.len()
}

pub fn on_pong(ctx: &mut TcpContext, payload: &[u8]) -> Result<(), PacketError> {
    let Timestamp(sent) = Timestamp::parse(payload)?;
    record_pong(&ctx.shared, ctx.session, sent);
    Ok(())
}

/// Round trip in ms from the echoed send timestamp.
pub(super) fn record_pong(shared: &Shared, session: SessionId, sent: i32) {
    let rtt = shared.clock.ticks().wrapping_sub(sent as u32);
    if let Some(record) = shared.sessions().get_mut(session) {
        record.link.stats.record_pong(rtt as f32);
        log::trace!("Session {} rtt {} ms", session, rtt);
    }
}

pub fn on_kudos(ctx: &mut TcpContext, payload: &[u8]) -> Result<(), PacketError> {
    log::info!(
        "Session {} sent kudos ({} bytes)",
        ctx.session,
        payload.len()
    );
    Ok(())
}

pub fn on_bps_request(ctx: &mut TcpContext, payload: &[u8]) -> Result<(), PacketError> {
    let request = BpsRequest::parse(payload)?;
    log::debug!("Session {} asked for {} B/s", ctx.session, request.rate);
    ctx.send(&packets::bps_reply(request.rate));
    Ok(())
}
