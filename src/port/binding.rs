use std::net::SocketAddr;
use std::sync::Arc;

use super::session::IceSession;
use super::IcePort;
use crate::packet::PacketInfo;
use crate::session::IceConnectionState;
use crate::stun::attributes::{ATTR_ICE_CONTROLLING, ATTR_PRIORITY, ATTR_USE_CANDIDATE};
use crate::stun::message::{
    MessageClass, StunMessage, TransactionId, METHOD_ALLOCATE, METHOD_BINDING,
    METHOD_CHANNEL_BIND, METHOD_CREATE_PERMISSION, METHOD_DATA, METHOD_REFRESH, METHOD_SEND,
};
use crate::transport::Socket;

// Peer-reflexive priority advertised in our connectivity checks,
// RFC 8445 Section 5.1.2:
// (type pref << 24) + (local pref << 8) + (256 - component).
const PRIORITY_TYPE_PREFERENCE: u32 = 110;
const PRIORITY_LOCAL_PREFERENCE: u32 = 65535;
const PRIORITY_COMPONENT_RTP: u32 = 1;

const fn candidate_priority() -> u32 {
    (PRIORITY_TYPE_PREFERENCE << 24)
        + (PRIORITY_LOCAL_PREFERENCE << 8)
        + (256 - PRIORITY_COMPONENT_RTP)
}

// STUN negotiation order:
// (State: New)
// [Server] <-- 1. Binding Request          --- [Peer]
// (State: Checking)
// [Server] --- 2. Binding Success Response --> [Peer]
// [Server] --- 3. Binding Request          --> [Peer]
// [Server] <-- 4. Binding Success Response --- [Peer]
// (State: Connected)
impl IcePort {
    pub(crate) async fn process_stun_packet(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        info: &PacketInfo,
        data: &[u8],
    ) {
        let message = match StunMessage::parse(data) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("discarding malformed STUN packet from {source}: {err}");
                return;
            }
        };
        log::trace!("received {message} from {source}");

        match message.method {
            METHOD_BINDING => match message.class {
                MessageClass::Request => {
                    self.process_binding_request(socket, source, info, &message)
                        .await
                }
                MessageClass::SuccessResponse => {
                    self.process_binding_response(source, &message).await
                }
                MessageClass::ErrorResponse => {
                    log::warn!("binding error response received from {source}")
                }
                MessageClass::Indication => {}
            },
            METHOD_ALLOCATE | METHOD_REFRESH | METHOD_SEND | METHOD_DATA
            | METHOD_CREATE_PERMISSION | METHOD_CHANNEL_BIND => {
                // TURN control methods are recognized but not served here.
                log::debug!("ignoring TURN {} {} from {source}", message.method, message.class);
            }
            method => log::warn!("unknown method {method} from {source}"),
        }
    }

    async fn process_binding_request(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        info: &PacketInfo,
        request: &StunMessage,
    ) {
        let (local_ufrag, remote_ufrag) = match request.ufrags() {
            Ok(ufrags) => ufrags,
            Err(err) => {
                log::warn!("could not process USERNAME of a binding request from {source}: {err}");
                return;
            }
        };
        log::debug!("{source} sent a binding request for {local_ufrag}:{remote_ufrag}");

        let session = { self.ufrag_map.lock().get(&local_ufrag).cloned() };
        let Some(session) = session else {
            log::debug!("no session for ufrag {local_ufrag} (add_session() needed), dropping");
            return;
        };

        if session.peer_sdp.ice_ufrag() != remote_ufrag {
            // The ufrag on the wire differs from the one signaled in the
            // peer SDP. Tolerated until remote descriptions are parsed
            // strictly everywhere.
            log::warn!(
                "mismatched ufrag: {remote_ufrag} (ufrag in peer SDP: {})",
                session.peer_sdp.ice_ufrag()
            );
        }

        if let Err(err) = request.check_integrity(session.offer_sdp.ice_pwd()) {
            log::warn!(
                "failed to check integrity of a binding request for session {}: {err}",
                session.info.id
            );
            self.evict_session(&session).await;
            return;
        }

        session.refresh();

        if session.bind_remote(Arc::clone(socket), source, info.channel_number) {
            {
                let mut active = self.active.lock();
                active.by_address.insert(source, Arc::clone(&session));
                active.by_id.insert(session.info.id, Arc::clone(&session));
            }
            self.set_ice_state(&session, IceConnectionState::Checking)
                .await;
        }

        self.send_binding_response(socket, source, request, &session)
            .await;
        self.send_binding_request(socket, source, &session).await;
    }

    /// Authentication failed: the session disappears from all three tables
    /// and no response is sent.
    async fn evict_session(&self, session: &Arc<IceSession>) {
        {
            let mut ufrag_map = self.ufrag_map.lock();
            ufrag_map.remove(session.local_ufrag());
        }
        {
            let mut active = self.active.lock();
            if let Some(address) = session.address() {
                active.by_address.remove(&address);
            }
            active.by_id.remove(&session.info.id);
        }

        self.set_ice_state(session, IceConnectionState::Failed).await;
    }

    async fn send_binding_response(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        request: &StunMessage,
        session: &Arc<IceSession>,
    ) {
        let mut response = StunMessage::new(
            MessageClass::SuccessResponse,
            METHOD_BINDING,
            request.transaction_id,
        );
        response.add_xor_mapped_address(source);

        let serialized = response.serialize(session.offer_sdp.ice_pwd());

        log::trace!("sending {response} to {source}");
        if let Err(err) = socket.send_to(source, &serialized).await {
            log::warn!("could not send a binding response to {source}: {err}");
        }
    }

    async fn send_binding_request(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        session: &Arc<IceSession>,
    ) {
        let mut request =
            StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
        request.add_username(&format!(
            "{}:{}",
            session.peer_sdp.ice_ufrag(),
            session.offer_sdp.ice_ufrag()
        ));
        request.add(ATTR_ICE_CONTROLLING, &self.tie_breaker.to_be_bytes());
        request.add(ATTR_USE_CANDIDATE, &[]);
        request.add(ATTR_PRIORITY, &candidate_priority().to_be_bytes());

        let serialized = request.serialize(session.peer_sdp.ice_pwd());

        log::trace!("sending {request} to {source}");
        if let Err(err) = socket.send_to(source, &serialized).await {
            log::warn!("could not send a binding request to {source}: {err}");
        }
    }

    async fn process_binding_response(&self, source: SocketAddr, response: &StunMessage) {
        let session = { self.active.lock().by_address.get(&source).cloned() };
        let Some(session) = session else {
            // Late, or from a candidate pair that lost the race; the first
            // address to bind wins.
            log::debug!("binding response from unknown address {source}, dropping");
            return;
        };

        if let Err(err) = response.check_integrity(session.offer_sdp.ice_pwd()) {
            // A spoofed response must not tear down the session.
            log::warn!("failed to check integrity of a binding response from {source}: {err}");
            return;
        }
        log::debug!("{source} sent a binding success response");

        if session.state() != IceConnectionState::Connected {
            self.set_ice_state(&session, IceConnectionState::Connected)
                .await;
        }
    }
}
