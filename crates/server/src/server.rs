use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{Notify, watch};

use wulf::net::packets::{self, CommMessage};
use wulf::net::{MAX_DATAGRAM_SIZE, split_datagram, trace};
use wulf::{
    EntityManager, EntityRemoved, NetworkStats, Route, ServerClock, SessionId, SessionRecord,
    SessionRegistry, TranslationTable,
};

use crate::commands::CommandTable;
use crate::config::ServerConfig;
use crate::handlers::{Handlers, UdpContext};
use crate::session;
use crate::simulation;
use crate::transport::{self, TcpOutbox, Transport};

/// Server-side half of a registry record.
#[derive(Debug)]
pub struct SessionLink {
    pub outbox: TcpOutbox,
    /// Raised by the UDP loop when this session's key is echoed.
    pub key_echoed: Arc<Notify>,
    pub stats: NetworkStats,
}

impl SessionLink {
    pub fn new(outbox: TcpOutbox) -> Self {
        Self {
            outbox,
            key_echoed: Arc::new(Notify::new()),
            stats: NetworkStats::default(),
        }
    }
}

pub type Sessions = SessionRegistry<SessionLink>;

/// State shared by every task. When both mutexes are needed the world lock
/// is taken first; the sessions lock is never held while taking the world.
#[derive(Debug)]
pub struct Shared {
    pub config: ServerConfig,
    pub clock: ServerClock,
    pub table: TranslationTable,
    pub handlers: Handlers,
    pub commands: CommandTable,
    pub udp: Arc<UdpSocket>,
    world: Mutex<EntityManager>,
    sessions: Mutex<Sessions>,
    shutdown: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub fn world(&self) -> MutexGuard<'_, EntityManager> {
        lock(&self.world)
    }

    pub fn sessions(&self) -> MutexGuard<'_, Sessions> {
        lock(&self.sessions)
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn transport_for(&self, id: SessionId) -> Option<Transport> {
        let sessions = self.sessions();
        sessions.get(id).map(|record| self.transport_of(record))
    }

    /// UDP once the session's address is bound, TCP otherwise.
    pub fn transport_of(&self, record: &SessionRecord<SessionLink>) -> Transport {
        match record.binding.route() {
            Route::Udp(addr) => Transport::Udp {
                socket: Arc::clone(&self.udp),
                addr,
            },
            Route::Tcp => Transport::Tcp(record.link.outbox.clone()),
        }
    }

    /// Sends over the session's preferred transport.
    pub fn send_to(&self, id: SessionId, payload: &[u8]) {
        let Some(transport) = self.transport_for(id) else {
            log::debug!("Dropping packet for closed session {}", id);
            return;
        };
        if let Err(e) = transport.send(payload) {
            log::warn!("Send to session {} failed: {}", id, e);
        }
    }

    pub fn send_udp(&self, addr: SocketAddr, payload: &[u8]) {
        if let Err(e) = transport::send_udp(&self.udp, addr, payload) {
            log::warn!("{}", e);
        }
    }

    pub fn system_message(&self, id: SessionId, text: &str) {
        let source = self
            .sessions()
            .get(id)
            .and_then(|s| s.player_id())
            .unwrap_or_default();
        self.send_to(id, &packets::comm_message(&CommMessage::system(source, text)));
    }

    /// Transports of every logged-in session, optionally skipping one.
    pub fn logged_in_transports(&self, except: Option<SessionId>) -> Vec<(SessionId, Transport)> {
        let sessions = self.sessions();
        sessions
            .logged_in()
            .filter(|s| Some(s.id) != except)
            .map(|s| (s.id, self.transport_of(s)))
            .collect()
    }

    pub fn broadcast(&self, payload: &[u8], except: Option<SessionId>) {
        for (id, transport) in self.logged_in_transports(except) {
            if let Err(e) = transport.send(payload) {
                log::warn!("Broadcast to session {} failed: {}", id, e);
            }
        }
    }

    pub fn broadcast_removals(&self, removed: &[EntityRemoved]) {
        for entity in removed {
            self.broadcast(&entity.packet(), None);
        }
    }

    /// Takes an entity out of the world. The removal is broadcast before the
    /// world lock is released.
    pub fn remove_entity(&self, net_id: u32) -> bool {
        let mut world = self.world();
        match world.remove(net_id) {
            Some(removed) => {
                self.broadcast_removals(&[removed]);
                true
            }
            None => false,
        }
    }
}

pub struct GameServer {
    shared: Arc<Shared>,
    listener: TcpListener,
}

impl GameServer {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.tcp_bind_addr()).await?;
        let udp = Arc::new(UdpSocket::bind(config.udp_bind_addr()).await?);
        let (shutdown, _) = watch::channel(false);

        let shared = Shared {
            clock: ServerClock::new(),
            table: TranslationTable::default(),
            handlers: Handlers::new(),
            commands: CommandTable::build(),
            udp,
            world: Mutex::new(EntityManager::new()),
            sessions: Mutex::new(SessionRegistry::new(config.max_sessions)),
            shutdown,
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            listener,
        })
    }

    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub fn local_tcp_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn local_udp_addr(&self) -> io::Result<SocketAddr> {
        self.shared.udp.local_addr()
    }

    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.shared.subscribe_shutdown();

        let udp_task = tokio::spawn(run_udp_loop(self.shared()));
        let tick_task = tokio::spawn(simulation::run_tick_loop(self.shared()));

        log::info!(
            "Listening on TCP {} / UDP {}",
            self.local_tcp_addr()?,
            self.local_udp_addr()?
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            log::info!("TCP connection from {}", peer);
                            tokio::spawn(session::run(self.shared(), stream, peer));
                        }
                        Err(e) => log::warn!("Accept failed: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        log::info!("Server shutting down");
        let _ = udp_task.await;
        let _ = tick_task.await;
        Ok(())
    }
}

async fn run_udp_loop(shared: Arc<Shared>) {
    let mut shutdown = shared.subscribe_shutdown();
    let sweep = (shared.config.stale_endpoint_timeout / 2).max(Duration::from_secs(1));
    let mut cleanup = tokio::time::interval(sweep);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            received = shared.udp.recv_from(&mut buf) => {
                match received {
                    Ok((len, addr)) => handle_datagram(&shared, &buf[..len], addr),
                    Err(e) => log::warn!("UDP receive failed: {}", e),
                }
            }
            _ = cleanup.tick() => {
                let removed = shared
                    .sessions()
                    .cleanup_stale_endpoints(shared.config.stale_endpoint_timeout);
                if removed > 0 {
                    log::debug!("Forgot {} idle UDP endpoints", removed);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

fn handle_datagram(shared: &Arc<Shared>, datagram: &[u8], addr: SocketAddr) {
    shared
        .sessions()
        .endpoint_mut(addr)
        .stats
        .record_received(datagram.len());

    for payload in split_datagram(datagram) {
        trace::log_packet("UDP-RECV", payload, Some(addr));
        // a key echo earlier in the same datagram may have bound the address
        let session = shared.sessions().session_for_addr(&addr);
        let mut ctx = UdpContext {
            shared: Arc::clone(shared),
            addr,
            session,
        };
        if let Err(e) = shared.handlers.udp.dispatch(&mut ctx, payload) {
            log::warn!("UDP packet from {} dropped: {}", addr, e);
        }
    }
}
