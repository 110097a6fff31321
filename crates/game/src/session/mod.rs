//! Per-player session state, split into who the player is, how to reach
//! them, and what they control in the world.

mod phase;
mod registry;

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::net::rand_u64;

pub use phase::{PhaseError, SessionPhase};
pub use registry::{
    ClaimOutcome, EndpointState, PLAYER_ID_BASE, RegistryError, SessionId, SessionRecord,
    SessionRegistry, UdpEndpointContext,
};

/// Length of a generated key in hex digits.
pub const SESSION_KEY_LEN: usize = 8;

/// One-time secret the client echoes over UDP to prove it owns an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        let value = rand_u64() & 0xFFFF_FFFF;
        Self(format!("{:0width$X}", value, width = SESSION_KEY_LEN))
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, echoed: &str) -> bool {
        !self.0.is_empty() && self.0 == echoed
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Assigned when both login rounds are done.
    pub player_id: Option<u32>,
    pub name: String,
    pub is_guest: bool,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<unnamed>"
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    /// Waiting for the key echo.
    #[default]
    Pending,
    Bound,
    /// The echo never came; traffic goes over TCP.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("already bound to {0}")]
    AlreadyBound(SocketAddr),
}

/// Where outbound traffic for a session goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Udp(SocketAddr),
    Tcp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportBinding {
    udp_addr: Option<SocketAddr>,
    state: BindingState,
}

impl TransportBinding {
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.state == BindingState::Bound
    }

    /// Binds once for the life of the connection. Binding the same address
    /// again is a no-op; a different address is refused.
    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), BindError> {
        match self.udp_addr {
            Some(existing) if existing != addr => Err(BindError::AlreadyBound(existing)),
            _ => {
                self.udp_addr = Some(addr);
                self.state = BindingState::Bound;
                Ok(())
            }
        }
    }

    /// Falls back to TCP delivery. Has no effect once bound.
    pub fn degrade(&mut self) {
        if self.state == BindingState::Pending {
            self.state = BindingState::Degraded;
        }
    }

    pub fn route(&self) -> Route {
        match (self.state, self.udp_addr) {
            (BindingState::Bound, Some(addr)) => Route::Udp(addr),
            _ => Route::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimState {
    pub team: u32,
    /// Net id of the vehicle this player drives.
    pub owned_entity: Option<u32>,
    /// Set once the client asks for world updates.
    pub wants_updates: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_generated_keys() {
        let key = SessionKey::generate();
        assert_eq!(key.as_str().len(), SESSION_KEY_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(key.matches(key.as_str()));
        assert!(!SessionKey::new("").matches(""));
    }

    #[test]
    fn test_bind_once() {
        let mut binding = TransportBinding::default();
        assert_eq!(binding.route(), Route::Tcp);
        binding.bind(addr(5000)).unwrap();
        assert_eq!(binding.route(), Route::Udp(addr(5000)));

        binding.bind(addr(5000)).unwrap();
        assert_eq!(
            binding.bind(addr(5001)),
            Err(BindError::AlreadyBound(addr(5000)))
        );
        assert_eq!(binding.udp_addr(), Some(addr(5000)));
    }

    #[test]
    fn test_degraded_then_late_bind() {
        let mut binding = TransportBinding::default();
        binding.degrade();
        assert_eq!(binding.state(), BindingState::Degraded);
        assert_eq!(binding.route(), Route::Tcp);

        binding.bind(addr(6000)).unwrap();
        assert!(binding.is_bound());
        binding.degrade();
        assert!(binding.is_bound());
    }
}
