use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use wulf::net::{encode_tcp_frame, trace};
use wulf::{PacketError, TransportKind};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("TCP connection to {0} is closed")]
    Closed(SocketAddr),
    #[error("UDP send to {addr} failed: {source}")]
    Udp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Frame(#[from] PacketError),
}

/// Queue feeding a connection's writer task. Payloads are framed here and
/// written in order.
#[derive(Debug, Clone)]
pub struct TcpOutbox {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    peer: SocketAddr,
}

impl TcpOutbox {
    pub fn new(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, peer }, rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let frame = encode_tcp_frame(payload)?;
        trace::log_packet("TCP-SEND", payload, Some(self.peer));
        self.tx.send(frame).map_err(|_| SendError::Closed(self.peer))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A resolved way to reach one client.
#[derive(Debug, Clone)]
pub enum Transport {
    Tcp(TcpOutbox),
    Udp {
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
    },
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Tcp(_) => TransportKind::Tcp,
            Transport::Udp { .. } => TransportKind::Udp,
        }
    }

    /// Fire and forget; never waits on the socket.
    pub fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        match self {
            Transport::Tcp(outbox) => outbox.send(payload),
            Transport::Udp { socket, addr } => send_udp(socket, *addr, payload),
        }
    }
}

pub fn send_udp(socket: &UdpSocket, addr: SocketAddr, payload: &[u8]) -> Result<(), SendError> {
    trace::log_packet("UDP-SEND", payload, Some(addr));
    socket
        .try_send_to(payload, addr)
        .map(|_| ())
        .map_err(|source| SendError::Udp { addr, source })
}
