use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Instant;
use util::sync::Mutex;

use crate::sdp::SessionDescription;
use crate::session::{IceConnectionState, SessionInfo};
use crate::transport::Socket;

/// Book-keeping for one session, shared between the registry tables and any
/// in-flight dispatcher. The mutable part is guarded by its own leaf mutex,
/// taken only after (never around) the registry locks and never held across
/// a callback or a send.
pub(crate) struct IceSession {
    pub(crate) info: SessionInfo,
    pub(crate) offer_sdp: Arc<SessionDescription>,
    pub(crate) peer_sdp: Arc<SessionDescription>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: IceConnectionState,
    remote: Option<Arc<dyn Socket>>,
    address: Option<SocketAddr>,
    channel_number: Option<u16>,
    deadline: Instant,
}

impl IceSession {
    pub(crate) fn new(
        info: SessionInfo,
        offer_sdp: Arc<SessionDescription>,
        peer_sdp: Arc<SessionDescription>,
    ) -> Self {
        let deadline = Instant::now() + info.timeout;
        IceSession {
            info,
            offer_sdp,
            peer_sdp,
            inner: Mutex::new(SessionInner {
                state: IceConnectionState::Closed,
                remote: None,
                address: None,
                channel_number: None,
                deadline,
            }),
        }
    }

    pub(crate) fn local_ufrag(&self) -> &str {
        self.offer_sdp.ice_ufrag()
    }

    pub(crate) fn state(&self) -> IceConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn set_state(&self, state: IceConnectionState) {
        self.inner.lock().state = state;
    }

    /// Pushes the expiry out by the configured timeout. Called on creation
    /// and on every accepted binding request.
    pub(crate) fn refresh(&self) {
        self.inner.lock().deadline = Instant::now() + self.info.timeout;
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now > self.inner.lock().deadline
    }

    /// Captures the transport the first valid binding request arrived on.
    /// Returns false if another request won the race.
    pub(crate) fn bind_remote(
        &self,
        socket: Arc<dyn Socket>,
        address: SocketAddr,
        channel_number: Option<u16>,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != IceConnectionState::New {
            return false;
        }
        inner.remote = Some(socket);
        inner.address = Some(address);
        inner.channel_number = channel_number;
        true
    }

    pub(crate) fn address(&self) -> Option<SocketAddr> {
        self.inner.lock().address
    }

    /// The bound transport, if any: socket handle, remote address and the
    /// TURN channel number the peer used.
    pub(crate) fn remote(&self) -> Option<(Arc<dyn Socket>, SocketAddr, Option<u16>)> {
        let inner = self.inner.lock();
        match (&inner.remote, inner.address) {
            (Some(socket), Some(address)) => {
                Some((Arc::clone(socket), address, inner.channel_number))
            }
            _ => None,
        }
    }
}
