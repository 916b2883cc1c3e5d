use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub type SocketId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        };
        write!(f, "{s}")
    }
}

/// Why a TCP connection went away.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Error,
}

/// Handle to the remote end of a datagram exchange: the listening socket
/// for UDP, one accepted connection for TCP. Owned by the physical-port
/// layer; this crate only borrows it for the lifetime of the connection.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Identifier unique among the sockets of one physical-port layer.
    fn id(&self) -> SocketId;

    fn transport(&self) -> Transport;

    /// Non-blocking send; returns bytes written.
    async fn send_to(&self, target: SocketAddr, data: &[u8]) -> Result<usize>;
}

/// A bound listening endpoint.
#[async_trait]
pub trait PhysicalPort: Send + Sync {
    fn transport(&self) -> Transport;

    fn local_addr(&self) -> SocketAddr;

    async fn close(&self) -> Result<()>;
}

/// How the embedding server hands out listening endpoints. Binding
/// registers the given observer for connection and data events.
#[async_trait]
pub trait PhysicalPortFactory: Send + Sync {
    async fn bind(
        &self,
        transport: Transport,
        address: SocketAddr,
        observer: Arc<dyn PhysicalPortObserver>,
    ) -> Result<Arc<dyn PhysicalPort>>;
}

/// Events delivered by the physical-port layer. Callbacks may arrive
/// concurrently for different sockets; callbacks for a single TCP
/// connection are serialized.
#[async_trait]
pub trait PhysicalPortObserver: Send + Sync {
    /// A TCP client connected.
    async fn on_connected(&self, socket: Arc<dyn Socket>);

    /// A datagram (UDP) or a chunk of stream bytes (TCP) arrived.
    async fn on_data(&self, socket: Arc<dyn Socket>, source: SocketAddr, data: &[u8]);

    /// A TCP client went away.
    async fn on_disconnected(&self, socket: Arc<dyn Socket>, reason: DisconnectReason);
}
