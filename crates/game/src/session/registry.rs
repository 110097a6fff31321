use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::net::NetworkStats;

use super::{BindError, Identity, Route, SessionKey, SimState, TransportBinding};

/// First player id handed out; keeps vehicle ids clear of world objects.
pub const PLAYER_ID_BASE: u32 = 1000;

pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("server full ({0} sessions)")]
    ServerFull(usize),
    #[error("no session {0}")]
    UnknownSession(SessionId),
    #[error("no pending session holds key {0:?}")]
    UnknownKey(String),
    #[error("key for session {session} already claimed by {bound_to}")]
    KeyAlreadyClaimed {
        session: SessionId,
        bound_to: SocketAddr,
    },
    #[error("{addr} is already bound to session {session}")]
    EndpointTaken { addr: SocketAddr, session: SessionId },
    #[error(transparent)]
    Bind(#[from] BindError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The address is now bound to this session.
    Bound(SessionId),
    /// The same address repeated an echo that already succeeded.
    AlreadyBound(SessionId),
}

impl ClaimOutcome {
    pub fn session(self) -> SessionId {
        match self {
            ClaimOutcome::Bound(id) | ClaimOutcome::AlreadyBound(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Sessionless,
    Bound(SessionId),
}

/// One remote UDP address as seen by the receive loop.
#[derive(Debug, Clone)]
pub struct UdpEndpointContext {
    pub addr: SocketAddr,
    pub state: EndpointState,
    outgoing_seq: u16,
    pub stats: NetworkStats,
}

impl UdpEndpointContext {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: EndpointState::Sessionless,
            outgoing_seq: 0,
            stats: NetworkStats::default(),
        }
    }

    /// Sequence number for the next server-to-client ACK.
    pub fn next_outgoing_seq(&mut self) -> u16 {
        self.outgoing_seq = self.outgoing_seq.wrapping_add(1);
        self.outgoing_seq
    }

    pub fn session(&self) -> Option<SessionId> {
        match self.state {
            EndpointState::Bound(id) => Some(id),
            EndpointState::Sessionless => None,
        }
    }

    pub fn is_stale(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stats.last_receive) > timeout
    }
}

/// Shared per-session record. `L` is whatever the server needs to reach the
/// TCP side of the session.
#[derive(Debug)]
pub struct SessionRecord<L> {
    pub id: SessionId,
    pub key: SessionKey,
    pub identity: Identity,
    pub binding: TransportBinding,
    pub sim: SimState,
    pub link: L,
}

impl<L> SessionRecord<L> {
    pub fn player_id(&self) -> Option<u32> {
        self.identity.player_id
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.player_id.is_some()
    }
}

#[derive(Debug)]
pub struct SessionRegistry<L> {
    sessions: HashMap<SessionId, SessionRecord<L>>,
    endpoints: HashMap<SocketAddr, UdpEndpointContext>,
    next_session_id: SessionId,
    next_player_id: u32,
    max_sessions: usize,
}

impl<L> SessionRegistry<L> {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            endpoints: HashMap::new(),
            next_session_id: 1,
            next_player_id: PLAYER_ID_BASE,
            max_sessions,
        }
    }

    pub fn open(&mut self, key: SessionKey, link: L) -> Result<SessionId, RegistryError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(RegistryError::ServerFull(self.max_sessions));
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            SessionRecord {
                id,
                key,
                identity: Identity::default(),
                binding: TransportBinding::default(),
                sim: SimState::default(),
                link,
            },
        );
        Ok(id)
    }

    /// Drops the session and releases its UDP address.
    pub fn close(&mut self, id: SessionId) -> Option<SessionRecord<L>> {
        let record = self.sessions.remove(&id)?;
        if let Some(addr) = record.binding.udp_addr() {
            self.endpoints.remove(&addr);
        }
        Some(record)
    }

    /// Binds `addr` to the session whose key was echoed.
    ///
    /// The first address to echo a key wins. A repeat echo from the same
    /// address succeeds without changing anything. Any other address
    /// echoing a claimed key is refused, as is an address already bound to
    /// a different session.
    pub fn claim_key(&mut self, addr: SocketAddr, echoed: &str) -> Result<ClaimOutcome, RegistryError> {
        let record = self
            .sessions
            .values_mut()
            .find(|s| s.key.matches(echoed))
            .ok_or_else(|| RegistryError::UnknownKey(echoed.to_string()))?;
        let session = record.id;

        match record.binding.udp_addr() {
            Some(bound) if bound == addr => return Ok(ClaimOutcome::AlreadyBound(session)),
            Some(bound_to) => return Err(RegistryError::KeyAlreadyClaimed { session, bound_to }),
            None => {}
        }

        if let Some(owner) = self.endpoints.get(&addr).and_then(UdpEndpointContext::session) {
            if owner != session {
                return Err(RegistryError::EndpointTaken {
                    addr,
                    session: owner,
                });
            }
        }

        record.binding.bind(addr)?;
        self.endpoint_mut(addr).state = EndpointState::Bound(session);
        Ok(ClaimOutcome::Bound(session))
    }

    pub fn assign_player_id(&mut self, id: SessionId) -> Result<u32, RegistryError> {
        let record = self
            .sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        if let Some(existing) = record.identity.player_id {
            return Ok(existing);
        }
        let player_id = self.next_player_id;
        self.next_player_id = self.next_player_id.wrapping_add(1).max(PLAYER_ID_BASE);
        record.identity.player_id = Some(player_id);
        Ok(player_id)
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionRecord<L>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionRecord<L>> {
        self.sessions.get_mut(&id)
    }

    /// Session bound to a UDP source address, if any.
    pub fn session_for_addr(&self, addr: &SocketAddr) -> Option<SessionId> {
        self.endpoints.get(addr).and_then(UdpEndpointContext::session)
    }

    pub fn endpoint(&self, addr: &SocketAddr) -> Option<&UdpEndpointContext> {
        self.endpoints.get(addr)
    }

    /// Context for a source address, created sessionless on first contact.
    pub fn endpoint_mut(&mut self, addr: SocketAddr) -> &mut UdpEndpointContext {
        self.endpoints
            .entry(addr)
            .or_insert_with(|| UdpEndpointContext::new(addr))
    }

    pub fn next_outgoing_seq(&mut self, addr: SocketAddr) -> u16 {
        self.endpoint_mut(addr).next_outgoing_seq()
    }

    pub fn route(&self, id: SessionId) -> Option<Route> {
        self.sessions.get(&id).map(|s| s.binding.route())
    }

    pub fn find_by_player(&self, player_id: u32) -> Option<&SessionRecord<L>> {
        self.sessions
            .values()
            .find(|s| s.identity.player_id == Some(player_id))
    }

    /// Forgets sessionless addresses that went quiet. Returns how many.
    pub fn cleanup_stale_endpoints(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.endpoints.len();
        self.endpoints.retain(|_, ep| {
            matches!(ep.state, EndpointState::Bound(_)) || !ep.is_stale(timeout, now)
        });
        before - self.endpoints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRecord<L>> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SessionRecord<L>> {
        self.sessions.values_mut()
    }

    pub fn logged_in(&self) -> impl Iterator<Item = &SessionRecord<L>> {
        self.sessions.values().filter(|s| s.is_logged_in())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}
