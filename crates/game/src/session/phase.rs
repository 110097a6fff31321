use std::fmt;

use thiserror::Error;

/// Connection lifecycle. Phases only ever move forward one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SessionPhase {
    #[default]
    TcpConnected,
    UdpConfigSent,
    KeyExchangeWait,
    LoginUsernameWait,
    LoginPasswordWait,
    LoggedIn,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("cannot move from {from} to {to}")]
    OutOfOrder { from: SessionPhase, to: SessionPhase },
    #[error("requires {required}, session is in {current}")]
    NotReady {
        current: SessionPhase,
        required: SessionPhase,
    },
}

impl SessionPhase {
    pub fn next(self) -> Option<Self> {
        use SessionPhase::*;
        match self {
            TcpConnected => Some(UdpConfigSent),
            UdpConfigSent => Some(KeyExchangeWait),
            KeyExchangeWait => Some(LoginUsernameWait),
            LoginUsernameWait => Some(LoginPasswordWait),
            LoginPasswordWait => Some(LoggedIn),
            LoggedIn => Some(Active),
            Active => None,
        }
    }

    /// Moves to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: SessionPhase) -> Result<(), PhaseError> {
        if self.next() != Some(to) {
            return Err(PhaseError::OutOfOrder { from: *self, to });
        }
        log::trace!("Session phase {} -> {}", self, to);
        *self = to;
        Ok(())
    }

    pub fn require(self, required: SessionPhase) -> Result<(), PhaseError> {
        if self >= required {
            Ok(())
        } else {
            Err(PhaseError::NotReady {
                current: self,
                required,
            })
        }
    }

    pub fn is_logged_in(self) -> bool {
        self >= SessionPhase::LoggedIn
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::TcpConnected => "tcp-connected",
            SessionPhase::UdpConfigSent => "udp-config-sent",
            SessionPhase::KeyExchangeWait => "key-exchange-wait",
            SessionPhase::LoginUsernameWait => "login-username-wait",
            SessionPhase::LoginPasswordWait => "login-password-wait",
            SessionPhase::LoggedIn => "logged-in",
            SessionPhase::Active => "active",
        };
        f.write_str(name)
    }
}
