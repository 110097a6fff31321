use std::collections::{HashMap, HashSet};
use std::fmt;

use super::protocol::PacketError;
use super::trace::packet_name;

/// Handlers receive the whole payload, opcode byte included.
pub type Handler<C> = fn(&mut C, &[u8]) -> Result<(), PacketError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("TCP"),
            TransportKind::Udp => f.write_str("UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled(u8),
    Unknown(u8),
}

/// Opcode to handler table for one transport. Built once at startup and
/// shared read-only by the receive loops.
pub struct PacketRegistry<C> {
    transport: TransportKind,
    handlers: HashMap<u8, Handler<C>>,
    quiet: HashSet<u8>,
    on_unknown: Handler<C>,
}

pub struct RegistryBuilder<C> {
    registry: PacketRegistry<C>,
}

fn ignore_unknown<C>(_ctx: &mut C, _payload: &[u8]) -> Result<(), PacketError> {
    Ok(())
}

impl<C> RegistryBuilder<C> {
    pub fn route(mut self, opcode: u8, handler: Handler<C>) -> Self {
        if self.registry.handlers.insert(opcode, handler).is_some() {
            log::warn!(
                "{} handler for 0x{:02X} registered twice, keeping the last",
                self.registry.transport,
                opcode
            );
        }
        self
    }

    /// Opcodes that fall through to the default handler without a warning.
    pub fn quiet(mut self, opcodes: &[u8]) -> Self {
        self.registry.quiet.extend(opcodes.iter().copied());
        self
    }

    pub fn on_unknown(mut self, handler: Handler<C>) -> Self {
        self.registry.on_unknown = handler;
        self
    }

    pub fn build(self) -> PacketRegistry<C> {
        self.registry
    }
}

impl<C> PacketRegistry<C> {
    pub fn builder(transport: TransportKind) -> RegistryBuilder<C> {
        RegistryBuilder {
            registry: Self {
                transport,
                handlers: HashMap::new(),
                quiet: HashSet::new(),
                on_unknown: ignore_unknown::<C>,
            },
        }
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn handles(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn dispatch(&self, ctx: &mut C, payload: &[u8]) -> Result<Dispatch, PacketError> {
        let Some(&opcode) = payload.first() else {
            return Err(PacketError::Empty);
        };

        match self.handlers.get(&opcode) {
            Some(handler) => {
                handler(ctx, payload)?;
                Ok(Dispatch::Handled(opcode))
            }
            None => {
                if self.quiet.contains(&opcode) {
                    log::trace!("{} ignoring {}", self.transport, packet_name(opcode));
                } else {
                    log::warn!(
                        "{} unknown opcode 0x{:02X} (len={})",
                        self.transport,
                        opcode,
                        payload.len()
                    );
                }
                (self.on_unknown)(ctx, payload)?;
                Ok(Dispatch::Unknown(opcode))
            }
        }
    }
}

impl<C> fmt::Debug for PacketRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<_> = self.handlers.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("PacketRegistry")
            .field("transport", &self.transport)
            .field("opcodes", &opcodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<&'static str>,
    }

    fn on_hello_tcp(ctx: &mut Recorder, _payload: &[u8]) -> Result<(), PacketError> {
        ctx.seen.push("tcp-hello");
        Ok(())
    }

    fn on_hello_udp(ctx: &mut Recorder, _payload: &[u8]) -> Result<(), PacketError> {
        ctx.seen.push("udp-key-echo");
        Ok(())
    }

    fn on_unknown(ctx: &mut Recorder, _payload: &[u8]) -> Result<(), PacketError> {
        ctx.seen.push("unknown");
        Ok(())
    }

    fn too_short(_ctx: &mut Recorder, payload: &[u8]) -> Result<(), PacketError> {
        Err(PacketError::TooShort {
            opcode: payload[0],
            len: payload.len(),
            min: 10,
        })
    }

    #[test]
    fn test_transport_scoped_routing() {
        let tcp = PacketRegistry::builder(TransportKind::Tcp)
            .route(0x13, on_hello_tcp)
            .build();
        let udp = PacketRegistry::builder(TransportKind::Udp)
            .route(0x13, on_hello_udp)
            .build();

        let mut ctx = Recorder::default();
        assert_eq!(tcp.dispatch(&mut ctx, &[0x13, 0x00]).unwrap(), Dispatch::Handled(0x13));
        udp.dispatch(&mut ctx, &[0x13, 0x01]).unwrap();
        assert_eq!(ctx.seen, vec!["tcp-hello", "udp-key-echo"]);
    }

    #[test]
    fn test_unknown_goes_to_default() {
        let registry = PacketRegistry::builder(TransportKind::Udp)
            .route(0x13, on_hello_udp)
            .quiet(&[0x40])
            .on_unknown(on_unknown)
            .build();

        let mut ctx = Recorder::default();
        assert_eq!(registry.dispatch(&mut ctx, &[0x77]).unwrap(), Dispatch::Unknown(0x77));
        assert_eq!(registry.dispatch(&mut ctx, &[0x40]).unwrap(), Dispatch::Unknown(0x40));
        assert_eq!(ctx.seen, vec!["unknown", "unknown"]);
        assert!(!registry.handles(0x77));
    }

    #[test]
    fn test_handler_error_is_returned() {
        let registry = PacketRegistry::builder(TransportKind::Udp)
            .route(0x20, too_short)
            .build();
        let mut ctx = Recorder::default();
        assert!(matches!(
            registry.dispatch(&mut ctx, &[0x20, 0x01]),
            Err(PacketError::TooShort { opcode: 0x20, .. })
        ));
        assert!(matches!(registry.dispatch(&mut ctx, &[]), Err(PacketError::Empty)));
    }
}
