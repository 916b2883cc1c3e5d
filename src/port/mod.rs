
mod binding;
mod session;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval, Instant};
use util::sync::{Mutex, RwLock};

use self::session::IceSession;
use crate::candidate::IceCandidate;
use crate::chandata::ChannelData;
use crate::demux::TcpDemultiplexer;
use crate::error::Result;
use crate::packet::{PacketInfo, PacketKind};
use crate::rand::{generate_tie_breaker, generate_ufrag_material};
use crate::sdp::SessionDescription;
use crate::session::{IceConnectionState, SessionId, SessionInfo};
use crate::transport::{
    DisconnectReason, PhysicalPort, PhysicalPortFactory, PhysicalPortObserver, Socket, SocketId,
    Transport,
};

const EXPIRE_CHECK_INTERVAL: Duration = Duration::from_millis(1000);
const GENERATED_UFRAG_LEN: usize = 6;

/// Events an ICE port reports to the media layers sitting on top of it.
/// Implementations must return quickly and must not call back into
/// mutating port operations.
#[async_trait]
pub trait IcePortObserver: Send + Sync {
    /// A session moved to a new connection state.
    async fn on_state_changed(&self, session: &SessionInfo, state: IceConnectionState);

    /// Application payload (DTLS, RTP/RTCP) arrived for a bound session.
    async fn on_data_received(&self, session: &SessionInfo, data: &[u8]);
}

#[derive(Default)]
struct ActiveSessions {
    by_address: HashMap<SocketAddr, Arc<IceSession>>,
    by_id: HashMap<SessionId, Arc<IceSession>>,
}

/// Terminates the ICE connectivity-check layer on one or more server
/// candidate endpoints: demultiplexes incoming datagrams, answers STUN
/// binding requests, pairs sessions with remote transport addresses and
/// forwards media payloads to its observers.
pub struct IcePort {
    factory: Arc<dyn PhysicalPortFactory>,
    tie_breaker: u64,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,

    physical_ports: Mutex<Vec<Arc<dyn PhysicalPort>>>,
    candidates: Mutex<Vec<IceCandidate>>,
    observers: RwLock<Vec<Arc<dyn IcePortObserver>>>,

    // Sessions waiting for their first binding request, keyed by the local
    // (offer) ufrag. When both registry locks are needed, this one is
    // taken first.
    ufrag_map: Mutex<HashMap<String, Arc<IceSession>>>,
    // Sessions whose remote address has been accepted, indexed both ways.
    active: Mutex<ActiveSessions>,

    // TCP connection id -> stream reframer.
    demultiplexers: RwLock<HashMap<SocketId, Arc<Mutex<TcpDemultiplexer>>>>,
}

impl IcePort {
    /// Creates a port and starts its expiration timer. Endpoints are bound
    /// later through [`create_ice_candidates`] and [`create_turn_server`].
    ///
    /// [`create_ice_candidates`]: IcePort::create_ice_candidates
    /// [`create_turn_server`]: IcePort::create_turn_server
    pub fn new(factory: Arc<dyn PhysicalPortFactory>) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        let port = Arc::new(IcePort {
            factory,
            tie_breaker: generate_tie_breaker(),
            closed: AtomicBool::new(false),
            closed_tx,
            physical_ports: Mutex::new(vec![]),
            candidates: Mutex::new(vec![]),
            observers: RwLock::new(vec![]),
            ufrag_map: Mutex::new(HashMap::new()),
            active: Mutex::new(ActiveSessions::default()),
            demultiplexers: RwLock::new(HashMap::new()),
        });

        IcePort::spawn_expire_timer(&port);
        port
    }

    fn spawn_expire_timer(port: &Arc<Self>) {
        let weak = Arc::downgrade(port);
        let mut closed_rx = port.closed_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(EXPIRE_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(port) = weak.upgrade() else { break };
                        port.check_expired_sessions().await;
                    }
                    _ = closed_rx.changed() => break,
                }
            }
        });
    }

    /// Binds one listening endpoint per distinct candidate port on the
    /// wildcard address. On any bind failure the partial setup is undone
    /// via [`close`] and the error returned.
    ///
    /// [`close`]: IcePort::close
    pub async fn create_ice_candidates(
        self: &Arc<Self>,
        candidate_list: Vec<IceCandidate>,
    ) -> Result<()> {
        let mut bound = HashSet::new();

        for candidate in &candidate_list {
            let port = candidate.address.port();
            if !bound.insert(port) {
                // Already opened; candidates sharing a port share a socket.
                continue;
            }

            let unspecified = match candidate.address.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            };
            let address = SocketAddr::new(unspecified, port);

            if let Err(err) = self.bind_endpoint(candidate.transport, address).await {
                let _ = self.close().await;
                return Err(err);
            }
        }

        *self.candidates.lock() = candidate_list;
        Ok(())
    }

    /// Binds the endpoint of the built-in TURN relay. Peers behind
    /// UDP-hostile networks reach us through it over TCP; their media still
    /// arrives on this port, wrapped in channel data.
    pub async fn create_turn_server(
        self: &Arc<Self>,
        transport: Transport,
        address: SocketAddr,
    ) -> Result<()> {
        self.bind_endpoint(transport, address).await
    }

    async fn bind_endpoint(self: &Arc<Self>, transport: Transport, address: SocketAddr) -> Result<()> {
        let observer = Arc::clone(self) as Arc<dyn PhysicalPortObserver>;
        match self.factory.bind(transport, address, observer).await {
            Ok(port) => {
                log::info!("ICE port is bound to {address}/{transport}");
                self.physical_ports.lock().push(port);
                Ok(())
            }
            Err(err) => {
                log::error!("could not create physical port for {address}/{transport}: {err}");
                Err(err)
            }
        }
    }

    pub fn ice_candidate_list(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn add_observer(&self, observer: Arc<dyn IcePortObserver>) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            log::warn!("observer is already registered");
            return false;
        }
        observers.push(observer);
        true
    }

    pub fn remove_observer(&self, observer: &Arc<dyn IcePortObserver>) -> bool {
        let mut observers = self.observers.write();
        let count = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        if observers.len() == count {
            log::warn!("observer is not registered");
            return false;
        }
        true
    }

    pub fn remove_observers(&self) {
        self.observers.write().clear();
    }

    pub fn has_observer(&self) -> bool {
        !self.observers.read().is_empty()
    }

    /// Registers a signaled session so the binding request carrying its
    /// ufrag can be matched. A duplicate ufrag is refused; the first
    /// registration wins.
    pub async fn add_session(
        &self,
        info: SessionInfo,
        offer_sdp: Arc<SessionDescription>,
        peer_sdp: Arc<SessionDescription>,
    ) {
        let local_ufrag = offer_sdp.ice_ufrag().to_owned();
        let remote_ufrag = peer_sdp.ice_ufrag().to_owned();
        let session = Arc::new(IceSession::new(info, offer_sdp, peer_sdp));

        {
            let mut ufrag_map = self.ufrag_map.lock();
            if let Some(existing) = ufrag_map.get(&local_ufrag) {
                log::warn!(
                    "duplicated ufrag {local_ufrag}:{remote_ufrag} for session {} (existing session {}), refusing",
                    session.info.id,
                    existing.info.id
                );
                return;
            }

            log::debug!(
                "adding session {} (ufrag {local_ufrag}:{remote_ufrag})",
                session.info.id
            );
            ufrag_map.insert(local_ufrag, Arc::clone(&session));
        }

        self.set_ice_state(&session, IceConnectionState::New).await;
    }

    /// Removes a session from every table it appears in. Idempotent;
    /// returns whether anything was removed.
    pub fn remove_session(&self, session_id: SessionId) -> bool {
        // A bound session is reachable through the session-id table.
        let session = { self.active.lock().by_id.get(&session_id).cloned() };
        if let Some(session) = session {
            {
                let mut ufrag_map = self.ufrag_map.lock();
                ufrag_map.remove(session.local_ufrag());
            }
            {
                let mut active = self.active.lock();
                active.by_id.remove(&session_id);
                if let Some(address) = session.address() {
                    active.by_address.remove(&address);
                }
            }
            return true;
        }

        // A pending session only the ufrag table knows about: no binding
        // request has arrived from it yet.
        let mut ufrag_map = self.ufrag_map.lock();
        let ufrag = ufrag_map
            .iter()
            .find_map(|(ufrag, session)| (session.info.id == session_id).then(|| ufrag.clone()));
        match ufrag {
            Some(ufrag) => {
                ufrag_map.remove(&ufrag);
                log::debug!("removed session {session_id} before any binding request arrived");
                true
            }
            None => {
                log::warn!("could not find session {session_id}");
                false
            }
        }
    }

    /// A fresh 6-character ufrag, unique among the pending sessions.
    pub fn generate_ufrag(&self) -> String {
        let ufrag_map = self.ufrag_map.lock();

        loop {
            let ufrag = generate_ufrag_material(GENERATED_UFRAG_LEN);
            if !ufrag_map.contains_key(&ufrag) {
                log::debug!("generated ufrag: {ufrag}");
                return ufrag;
            }
        }
    }

    /// Connection state of a bound session, None before its first accepted
    /// binding request or after removal.
    pub fn state(&self, session_info: &SessionInfo) -> Option<IceConnectionState> {
        let active = self.active.lock();
        active.by_id.get(&session_info.id).map(|s| s.state())
    }

    /// Sends media back through the transport the session was bound on.
    /// Payloads for TCP-bound sessions travel inside TURN channel data.
    /// Returns false when the session is unknown or not yet bound.
    pub async fn send(&self, session_info: &SessionInfo, data: &[u8]) -> bool {
        let session = { self.active.lock().by_id.get(&session_info.id).cloned() };
        let Some(session) = session else {
            return false;
        };
        let Some((socket, address, channel_number)) = session.remote() else {
            return false;
        };

        let payload = match (socket.transport(), channel_number) {
            (Transport::Tcp, Some(number)) => ChannelData {
                number,
                data: data.to_vec(),
            }
            .encode(),
            _ => data.to_vec(),
        };

        match socket.send_to(address, &payload).await {
            Ok(_) => true,
            Err(err) => {
                log::warn!("could not send {} bytes to {address}: {err}", data.len());
                false
            }
        }
    }

    /// Stops the expiration timer, closes every bound endpoint and drops
    /// all observers. Transport callbacks arriving afterwards are ignored.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.closed_tx.send(true);

        let ports: Vec<Arc<dyn PhysicalPort>> = { self.physical_ports.lock().drain(..).collect() };
        let mut result = Ok(());
        for port in ports {
            if let Err(err) = port.close().await {
                log::warn!("could not close endpoint {}: {err}", port.local_addr());
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        self.candidates.lock().clear();
        self.remove_observers();
        result
    }

    /// Two-phase sweep of sessions whose binding deadline passed: collect
    /// and unlink under the ufrag lock, unlink from the active tables under
    /// theirs, then notify with no lock held.
    async fn check_expired_sessions(&self) {
        let now = Instant::now();

        let expired: Vec<Arc<IceSession>> = {
            let mut ufrag_map = self.ufrag_map.lock();
            let ufrags: Vec<String> = ufrag_map
                .iter()
                .filter(|(_, session)| session.is_expired(now))
                .map(|(ufrag, _)| ufrag.clone())
                .collect();
            ufrags
                .iter()
                .filter_map(|ufrag| ufrag_map.remove(ufrag))
                .collect()
        };
        if expired.is_empty() {
            return;
        }

        for session in &expired {
            session.set_state(IceConnectionState::Disconnected);
        }

        {
            let mut active = self.active.lock();
            for session in &expired {
                if let Some(address) = session.address() {
                    active.by_address.remove(&address);
                }
                active.by_id.remove(&session.info.id);
            }
        }

        for session in expired {
            log::debug!("session {} expired", session.info.id);
            self.notify_state_changed(&session, IceConnectionState::Disconnected)
                .await;
        }
    }

    pub(crate) async fn set_ice_state(&self, session: &Arc<IceSession>, state: IceConnectionState) {
        session.set_state(state);
        self.notify_state_changed(session, state).await;
    }

    async fn notify_state_changed(&self, session: &Arc<IceSession>, state: IceConnectionState) {
        let observers = { self.observers.read().clone() };
        for observer in observers {
            observer.on_state_changed(&session.info, state).await;
        }
    }

    async fn dispatch(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        info: PacketInfo,
        data: &[u8],
    ) {
        match info.kind {
            PacketKind::Stun => self.process_stun_packet(socket, source, &info, data).await,
            PacketKind::TurnChannelData => self.process_channel_data(socket, source, data).await,
            PacketKind::Dtls | PacketKind::RtpRtcp => {
                self.forward_application_packet(source, data).await
            }
            // Not supported, discard.
            PacketKind::Zrtp | PacketKind::Unknown => {}
        }
    }

    /// Strips the channel-data header and dispatches the payload again.
    /// Exactly one level of decapsulation: nested channel data is dropped.
    async fn process_channel_data(
        &self,
        socket: &Arc<dyn Socket>,
        source: SocketAddr,
        data: &[u8],
    ) {
        let message = match ChannelData::decode(data) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("discarding malformed channel data from {source}: {err}");
                return;
            }
        };

        let mut info = PacketInfo::new(PacketKind::of(&message.data));
        info.channel_number = Some(message.number);

        match info.kind {
            PacketKind::Stun => {
                self.process_stun_packet(socket, source, &info, &message.data)
                    .await
            }
            PacketKind::Dtls | PacketKind::RtpRtcp => {
                self.forward_application_packet(source, &message.data).await
            }
            PacketKind::TurnChannelData | PacketKind::Zrtp | PacketKind::Unknown => {}
        }
    }

    async fn forward_application_packet(&self, source: SocketAddr, data: &[u8]) {
        let session = { self.active.lock().by_address.get(&source).cloned() };
        let Some(session) = session else {
            log::trace!("no session bound to {source}, dropping {} bytes", data.len());
            return;
        };

        let observers = { self.observers.read().clone() };
        for observer in observers {
            observer.on_data_received(&session.info, data).await;
        }
    }
}

#[async_trait]
impl PhysicalPortObserver for IcePort {
    async fn on_connected(&self, socket: Arc<dyn Socket>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if socket.transport() != Transport::Tcp {
            return;
        }

        // A TURN client connected to the relay endpoint over TCP.
        let mut demultiplexers = self.demultiplexers.write();
        demultiplexers.insert(socket.id(), Arc::new(Mutex::new(TcpDemultiplexer::new())));
    }

    async fn on_data(&self, socket: Arc<dyn Socket>, source: SocketAddr, data: &[u8]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        match socket.transport() {
            Transport::Udp => {
                let info = PacketInfo::new(PacketKind::of(data));
                self.dispatch(&socket, source, info, data).await;
            }
            Transport::Tcp => {
                // The only traffic on ICE/TCP is STUN and channel data;
                // both are reframed out of the byte stream first.
                let demultiplexer = { self.demultiplexers.read().get(&socket.id()).cloned() };
                let Some(demultiplexer) = demultiplexer else {
                    log::error!("TCP payload but no demultiplexer for socket {}", socket.id());
                    return;
                };

                let frames = {
                    let mut demultiplexer = demultiplexer.lock();
                    demultiplexer.append(data);
                    let mut frames = vec![];
                    while let Some(frame) = demultiplexer.pop_frame() {
                        frames.push(frame);
                    }
                    frames
                };

                for frame in frames {
                    let info = PacketInfo::new(frame.kind);
                    self.dispatch(&socket, source, info, &frame.data).await;
                }
            }
        }
    }

    async fn on_disconnected(&self, socket: Arc<dyn Socket>, reason: DisconnectReason) {
        log::debug!("socket {} disconnected ({reason:?})", socket.id());

        let mut demultiplexers = self.demultiplexers.write();
        demultiplexers.remove(&socket.id());
    }
}

impl fmt::Display for IcePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<IcePort: {} endpoints>", self.physical_ports.lock().len())
    }
}
