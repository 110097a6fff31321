//! One task per TCP connection. The session lives exactly as long as the
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use wulf::net::packets;
use wulf::net::{TCP_HEADER_LEN, tcp_body_len, trace};
use wulf::{RegistryError, SessionId, SessionKey, SessionPhase};

use crate::handlers::TcpContext;
use crate::server::{SessionLink, Shared};
use crate::transport::TcpOutbox;

pub async fn run(shared: Arc<Shared>, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("set_nodelay on {} failed: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    let (outbox, outgoing) = TcpOutbox::new(peer);
    let writer_task = tokio::spawn(write_loop(writer, outgoing, peer));

    let opened = shared
        .sessions()
        .open(SessionKey::generate(), SessionLink::new(outbox.clone()));
    let session = match opened {
        Ok(id) => id,
        Err(RegistryError::ServerFull(max)) => {
            log::warn!("Refusing {}: server full ({} sessions)", peer, max);
            return;
        }
        Err(e) => {
            log::warn!("Refusing {}: {}", peer, e);
            return;
        }
    };
    log::info!("Session {} opened for {}", session, peer);

    let (frames_tx, frames) = mpsc::channel(64);
    let reader_task = tokio::spawn(read_loop(reader, frames_tx, peer));

    let mut ctx = TcpContext::new(Arc::clone(&shared), session, outbox);
    if let Err(e) = drive(&mut ctx, frames).await {
        log::info!("Session {} ended: {:#}", session, e);
    }

    teardown(&shared, session);
    reader_task.abort();
    drop(ctx);
    let _ = writer_task.await;
}

/// Forwards complete frames to the session task. Ends on close or error.
async fn read_loop(mut reader: OwnedReadHalf, frames: mpsc::Sender<Vec<u8>>, peer: SocketAddr) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(frame).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                log::debug!("{} closed the connection", peer);
                return;
            }
            Err(e) => {
                log::warn!("TCP read from {} failed: {:#}", peer, e);
                return;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    peer: SocketAddr,
) {
    while let Some(frame) = outgoing.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            log::warn!("TCP write to {} failed: {}", peer, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads one length-prefixed frame. `None` on a clean close.
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; TCP_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut body = vec![0u8; tcp_body_len(header)?];
    reader
        .read_exact(&mut body)
        .await
        .context("connection closed mid-frame")?;
    Ok(Some(body))
}

async fn drive(ctx: &mut TcpContext, mut frames: mpsc::Receiver<Vec<u8>>) -> Result<()> {
    let shared = Arc::clone(&ctx.shared);
    let config = &shared.config;
    let mut shutdown = shared.subscribe_shutdown();
    if *shutdown.borrow() {
        return Ok(());
    }

    let key_echoed = shared
        .sessions()
        .get(ctx.session)
        .map(|s| Arc::clone(&s.link.key_echoed))
        .context("session vanished before the handshake")?;

    let udp_port = shared.udp.local_addr()?.port();
    ctx.begin_key_exchange(udp_port);

    let key_deadline = time::sleep(config.key_wait);
    tokio::pin!(key_deadline);

    let mut ping = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let waiting_for_key = ctx.phase == SessionPhase::KeyExchangeWait;
        tokio::select! {
            frame = frames.recv() => {
                let Some(payload) = frame else {
                    return Ok(());
                };
                trace::log_packet("TCP-RECV", &payload, Some(ctx.outbox.peer()));
                if let Err(e) = shared.handlers.tcp.dispatch(ctx, &payload) {
                    log::warn!("Session {}: TCP packet dropped: {}", ctx.session, e);
                }
            }
            _ = key_echoed.notified(), if waiting_for_key => {
                ctx.key_exchange_done(true);
            }
            _ = &mut key_deadline, if waiting_for_key => {
                ctx.key_exchange_done(false);
            }
            _ = ping.tick() => {
                if !send_ping(&shared, ctx) {
                    anyhow::bail!("{} pings went unanswered", config.missed_pong_limit);
                }
            }
            _ = shutdown.changed() => return Ok(()),
        }

        if ctx.outbox.is_closed() {
            anyhow::bail!("TCP writer closed");
        }
    }
}

/// Sends the periodic ping. Returns false once the peer has missed more
/// pongs than the configured limit.
fn send_ping(shared: &Shared, ctx: &TcpContext) -> bool {
    let limit = shared.config.missed_pong_limit;
    let missed = match shared.sessions().get_mut(ctx.session) {
        Some(record) => {
            record.link.stats.record_ping();
            record.link.stats.missed_pongs
        }
        None => return false,
    };
    if limit > 0 && missed > limit {
        return false;
    }
    ctx.send(&packets::ping_request(shared.clock.ticks()));
    true
}

/// Releases the UDP binding and takes the player's vehicle out of the world.
fn teardown(shared: &Shared, session: SessionId) {
    let Some(record) = shared.sessions().close(session) else {
        return;
    };
    if let Some(vehicle) = record.sim.owned_entity {
        shared.remove_entity(vehicle);
    }
    log::info!(
        "Session {} closed ({}, player {:?})",
        session,
        record.identity.display_name(),
        record.player_id()
    );
}
