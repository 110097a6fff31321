//! End-to-end runs against a live server on localhost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use glam::Vec3;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;

use wulf::net::{BitReader, BitWriter, encode_tcp_frame, opcode, packets};
use wulf::world::update_array::decode;
use wulf::{DirtyMask, PLAYER_ID_BASE, SessionId, SessionKey, UpdateKind};

use crate::config::ServerConfig;
use crate::handlers::{join_world_view, spawn_vehicle};
use crate::server::{GameServer, SessionLink, Shared};
use crate::simulation::tick_world;
use crate::transport::TcpOutbox;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    shared: Arc<Shared>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
}

fn local_config(key_wait: Duration) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1".to_string(),
        tcp_port: 0,
        udp_port: 0,
        tick_rate: 20,
        ping_interval: Duration::from_secs(60),
        key_wait,
        ..Default::default()
    }
}

async fn start(key_wait: Duration) -> Harness {
    let server = GameServer::bind(local_config(key_wait)).await.unwrap();
    let harness = Harness {
        shared: server.shared(),
        tcp_addr: server.local_tcp_addr().unwrap(),
        udp_addr: server.local_udp_addr().unwrap(),
    };
    tokio::spawn(server.run());
    harness
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    timeout(WAIT, stream.read_exact(&mut header))
        .await
        .expect("timed out waiting for a TCP frame")
        .unwrap();
    let mut body = vec![0u8; u16::from_be_bytes(header) as usize - 2];
    stream.read_exact(&mut body).await.unwrap();
    body
}

/// Reads frames until one matches, returning everything seen on the way.
async fn read_until(stream: &mut TcpStream, wanted: impl Fn(&[u8]) -> bool) -> Vec<Vec<u8>> {
    let mut seen = Vec::new();
    loop {
        let frame = read_frame(stream).await;
        let done = wanted(&frame);
        seen.push(frame);
        if done {
            return seen;
        }
    }
}

async fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&encode_tcp_frame(payload).unwrap())
        .await
        .unwrap();
}

async fn recv_udp(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 2048];
    let (n, _) = timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .unwrap();
    buf[..n].to_vec()
}

fn key_echo(key: &str) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_u8(opcode::HELLO);
    w.write_u8(1);
    w.write_string(key);
    w.into_bytes()
}

fn login(text: &str) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_u8(opcode::LOGIN);
    w.write_u8(0);
    w.write_string(text);
    w.into_bytes()
}

fn chat(seq: u16, scope: u16, text: &str) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_u8(opcode::CHAT);
    w.write_u16(seq);
    w.write_u16(0);
    w.write_u16(scope);
    w.write_u16(0);
    w.write_string(text);
    w.into_bytes()
}

fn comm_text(payload: &[u8]) -> String {
    let mut r = BitReader::new(&payload[13..]);
    r.read_string().unwrap()
}

/// Connects and reads up to the session key.
async fn connect(harness: &Harness) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(harness.tcp_addr).await.unwrap();
    let frames = read_until(&mut stream, |f| f.starts_with(&[opcode::HELLO, 2])).await;
    let config = &frames[0];
    assert_eq!(&config[..2], &[opcode::HELLO, 1]);
    assert_eq!(
        u16::from_be_bytes([config[2], config[3]]),
        harness.udp_addr.port()
    );

    let mut r = BitReader::new(&frames[frames.len() - 1][2..]);
    let key = r.read_string().unwrap();
    (stream, key)
}

async fn log_in(stream: &mut TcpStream, name: &str) -> Vec<Vec<u8>> {
    send_frame(stream, &login(name)).await;
    read_until(stream, |f| f == [opcode::LOGIN_STATUS, 1, 1]).await;
    send_frame(stream, &login("secret")).await;
    read_until(stream, |f| f[0] == opcode::WORLD_STATS).await
}

#[tokio::test]
async fn test_key_echo_then_udp_chat() {
    let harness = start(Duration::from_secs(5)).await;
    let (mut stream, key) = connect(&harness).await;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&key_echo(&key), harness.udp_addr).await.unwrap();
    assert_eq!(recv_udp(&udp).await, vec![opcode::IDENTIFIED_UDP]);
    read_until(&mut stream, |f| f == [opcode::HELLO, 3]).await;

    let after_login = log_in(&mut stream, "alice").await;
    let opcodes: Vec<u8> = after_login.iter().map(|f| f[0]).collect();
    let team = opcodes.iter().position(|&op| op == opcode::TEAM_INFO).unwrap();
    let roster = opcodes
        .iter()
        .position(|&op| op == opcode::ADD_TO_ROSTER)
        .unwrap();
    assert!(team < roster);
    assert!(after_login.contains(&vec![opcode::LOGIN_STATUS, 1, 8]));
    let motd = opcodes.iter().position(|&op| op == opcode::MOTD).unwrap();
    let behavior = opcodes.iter().position(|&op| op == opcode::BEHAVIOR).unwrap();
    let translation = opcodes
        .iter()
        .position(|&op| op == opcode::TRANSLATION)
        .unwrap();
    assert!(motd < behavior && behavior < translation);
    assert_eq!(opcodes.last(), Some(&opcode::WORLD_STATS));
    let info = &after_login[opcodes.iter().position(|&op| op == opcode::PLAYER_INFO).unwrap()];
    assert_eq!(
        u32::from_be_bytes([info[1], info[2], info[3], info[4]]),
        PLAYER_ID_BASE
    );

    udp.send_to(&chat(7, 0, "hello there"), harness.udp_addr)
        .await
        .unwrap();
    let ack = recv_udp(&udp).await;
    assert_eq!(ack[0], opcode::ACK);
    assert_eq!(&ack[3..], &[0x00, 0x09, 0x01, opcode::CHAT, 0x00, 0x07]);

    let message = recv_udp(&udp).await;
    assert_eq!(message[0], opcode::COMM_MESSAGE);
    assert_eq!(comm_text(&message), "hello there");
}

#[tokio::test]
async fn test_unbound_udp_chat_is_dropped() {
    let harness = start(Duration::from_secs(5)).await;
    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&chat(1, 0, "spoofed"), harness.udp_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let reply = timeout(Duration::from_millis(300), udp.recv_from(&mut buf)).await;
    assert!(reply.is_err(), "unbound endpoint got a reply");
    assert_eq!(harness.shared.sessions().len(), 0);
}

#[tokio::test]
async fn test_missing_echo_falls_back_to_tcp() {
    let harness = start(Duration::from_millis(200)).await;
    let (mut stream, _key) = connect(&harness).await;

    let frames = read_until(&mut stream, |f| f == [opcode::HELLO, 3]).await;
    assert!(frames.contains(&vec![opcode::IDENTIFIED_UDP]));

    log_in(&mut stream, "bob").await;
    send_frame(&mut stream, &[opcode::WANT_UPDATES]).await;
    let welcome = read_frame(&mut stream).await;
    assert_eq!(welcome[0], opcode::COMM_MESSAGE);
    assert_eq!(
        comm_text(&welcome),
        "Server: Welcome to Wulfram on Wulf-Forge!"
    );
}

#[tokio::test]
async fn test_rosters_converge() {
    let harness = start(Duration::from_millis(100)).await;

    let (mut first, _) = connect(&harness).await;
    read_until(&mut first, |f| f == [opcode::HELLO, 3]).await;
    log_in(&mut first, "first").await;

    let (mut second, _) = connect(&harness).await;
    read_until(&mut second, |f| f == [opcode::HELLO, 3]).await;
    let frames = log_in(&mut second, "second").await;
    let rosters = frames
        .iter()
        .filter(|f| f[0] == opcode::ADD_TO_ROSTER)
        .count();
    assert_eq!(rosters, 2);

    let pushed = read_frame(&mut first).await;
    assert_eq!(pushed[0], opcode::ADD_TO_ROSTER);
    assert_eq!(
        u32::from_be_bytes([pushed[1], pushed[2], pushed[3], pushed[4]]),
        PLAYER_ID_BASE + 1
    );
}

fn bps_request(rate: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_u8(opcode::BPS_REQUEST);
    w.write_u32(rate);
    w.into_bytes()
}

#[tokio::test]
async fn test_bps_request_is_answered_on_both_transports() {
    let harness = start(Duration::from_millis(100)).await;
    let (mut stream, _) = connect(&harness).await;
    read_until(&mut stream, |f| f == [opcode::HELLO, 3]).await;

    send_frame(&mut stream, &bps_request(15_000)).await;
    let reply = read_until(&mut stream, |f| f[0] == opcode::BPS_REQUEST).await;
    assert_eq!(reply.last(), Some(&packets::bps_reply(15_000)));

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&bps_request(8_000), harness.udp_addr).await.unwrap();
    assert_eq!(recv_udp(&udp).await, packets::bps_reply(8_000));
}

/// A server with no tick loop, so tests drive the world by hand.
async fn idle_server() -> Arc<Shared> {
    GameServer::bind(local_config(Duration::from_secs(5)))
        .await
        .unwrap()
        .shared()
}

fn open_logged_in(shared: &Shared) -> (SessionId, TcpOutbox, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (outbox, rx) = TcpOutbox::new("127.0.0.1:9".parse().unwrap());
    let mut sessions = shared.sessions();
    let id = sessions
        .open(SessionKey::generate(), SessionLink::new(outbox.clone()))
        .unwrap();
    sessions.assign_player_id(id).unwrap();
    (id, outbox, rx)
}

/// Queued frames with their length prefix removed.
fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame[2..].to_vec());
    }
    frames
}

#[tokio::test]
async fn test_viewer_gets_changes_made_after_its_snapshot() {
    let shared = idle_server().await;
    let net_id = shared.world().create(5, 1, Vec3::ZERO, None).unwrap();
    tick_world(&shared, 0.0);

    let (viewer, outbox, mut rx) = open_logged_in(&shared);
    assert_eq!(join_world_view(&shared, viewer, &outbox), 1);
    assert!(shared.sessions().get(viewer).unwrap().sim.wants_updates);
    let snapshot = drain(&mut rx);
    let view = decode(&snapshot[0], &shared.table).unwrap();
    assert_eq!(view.kind, UpdateKind::View);
    assert!(view.entities.iter().any(|e| e.net_id == net_id as i32));

    shared
        .world()
        .get_mut(net_id)
        .unwrap()
        .set_velocity(Vec3::new(4.0, 0.0, 0.0));
    tick_world(&shared, 0.0);

    let deltas = drain(&mut rx);
    let update = decode(&deltas[0], &shared.table).unwrap();
    assert_eq!(update.kind, UpdateKind::Delta);
    let entity = update
        .entities
        .iter()
        .find(|e| e.net_id == net_id as i32)
        .unwrap();
    assert!(entity.mask.contains(DirtyMask::VELOCITY));
}

#[tokio::test]
async fn test_respawn_removal_precedes_new_vehicle() {
    let shared = idle_server().await;
    let (player, outbox, mut rx) = open_logged_in(&shared);
    join_world_view(&shared, player, &outbox);

    let vehicle = spawn_vehicle(&shared, player, 0, Vec3::new(10.0, 10.0, 10.0));
    assert_eq!(vehicle, Some(PLAYER_ID_BASE));
    tick_world(&shared, 0.0);
    drain(&mut rx);

    spawn_vehicle(&shared, player, 0, Vec3::new(20.0, 20.0, 20.0));
    tick_world(&shared, 0.0);
    let frames = drain(&mut rx);

    let removal = frames
        .iter()
        .position(|f| *f == packets::entity_remove(PLAYER_ID_BASE))
        .unwrap();
    let definition = frames
        .iter()
        .position(|f| {
            f[0] == opcode::UPDATE_ARRAY
                && decode(f, &shared.table).unwrap().entities.iter().any(|e| {
                    e.net_id == PLAYER_ID_BASE as i32 && e.mask.contains(DirtyMask::DEFINITION)
                })
        })
        .unwrap();
    assert!(removal < definition);
    assert!(shared.world().get(PLAYER_ID_BASE).is_some());
}
