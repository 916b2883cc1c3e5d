use std::fmt;
use std::net::SocketAddr;

use crate::transport::Transport;

/// A server-side ICE candidate: one transport endpoint advertised to peers
/// through signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub transport: Transport,
    pub address: SocketAddr,
}

impl IceCandidate {
    pub fn new(transport: Transport, address: SocketAddr) -> Self {
        IceCandidate { transport, address }
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.transport)
    }
}
