//! In-memory transport engine for exercising the SFU without real networking

#![allow(dead_code)]

use async_trait::async_trait;
use splitcast_protocol::{ClientId, IceCandidate, ServerMessage};
use splitcast_server::sfu::{ClientSession, ControlChannel, SessionManager};
use splitcast_server::transport::{
    ConnectionRole, ForwardTrack, InboundTrack, MediaKind, OnInboundTrackFn, PeerConnection,
    SdpKind, TransportEngine, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// SDP that the mock refuses as a remote description
pub const INVALID_SDP: &str = "not an sdp";

/// Candidate string that the mock refuses
pub const INVALID_CANDIDATE: &str = "candidate:garbage";

#[derive(Default)]
struct EngineState {
    connections: Mutex<Vec<Arc<MockConnection>>>,
    /// Tracks published by this owner fail to be added to any connection
    rejected_owner: Mutex<Option<ClientId>>,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<EngineState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.state.connections.lock().unwrap().clone()
    }

    pub fn connections_with_role(&self, role: ConnectionRole) -> Vec<Arc<MockConnection>> {
        self.connections()
            .into_iter()
            .filter(|c| c.role == role)
            .collect()
    }

    /// Most recently created connection with the given role
    pub fn last(&self, role: ConnectionRole) -> Arc<MockConnection> {
        self.connections_with_role(role)
            .pop()
            .expect("no connection with that role")
    }

    /// Total add-track calls across every connection
    pub fn add_track_calls(&self) -> usize {
        self.connections().iter().map(|c| c.add_track_calls()).sum()
    }

    pub fn reject_tracks_of(&self, owner: &ClientId) {
        *self.state.rejected_owner.lock().unwrap() = Some(owner.clone());
    }
}

#[async_trait]
impl TransportEngine for MockEngine {
    type Packet = u32;
    type Inbound = MockInbound;
    type Track = MockTrack;
    type Connection = MockConnection;

    async fn create_connection(
        &self,
        role: ConnectionRole,
    ) -> Result<Arc<MockConnection>, TransportError> {
        let mut connections = self.state.connections.lock().unwrap();
        let connection = Arc::new(MockConnection {
            index: connections.len(),
            role,
            engine: self.state.clone(),
            remote: Mutex::new(vec![]),
            tracks: Mutex::new(vec![]),
            add_track_calls: AtomicUsize::new(0),
            candidates: Mutex::new(vec![]),
            closes: AtomicUsize::new(0),
            handler: Mutex::new(None),
        });
        connections.push(connection.clone());
        Ok(connection)
    }

    fn create_forward_track(
        &self,
        owner: &ClientId,
        inbound: &MockInbound,
    ) -> Result<Arc<MockTrack>, TransportError> {
        Ok(Arc::new(MockTrack {
            id: format!("track-{}-{}", owner, inbound.kind),
            owner: owner.clone(),
            written: Mutex::new(vec![]),
        }))
    }
}

pub struct MockConnection {
    pub index: usize,
    pub role: ConnectionRole,
    engine: Arc<EngineState>,
    remote: Mutex<Vec<(SdpKind, String)>>,
    tracks: Mutex<Vec<String>>,
    add_track_calls: AtomicUsize,
    candidates: Mutex<Vec<IceCandidate>>,
    closes: AtomicUsize,
    handler: Mutex<Option<OnInboundTrackFn<MockInbound>>>,
}

impl MockConnection {
    pub fn remote_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.remote.lock().unwrap().clone()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn add_track_calls(&self) -> usize {
        self.add_track_calls.load(Ordering::SeqCst)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Simulate the client starting to send a stream of `kind`. Returns the
    /// sender side of the stream; dropping it ends the stream.
    pub async fn receive_track(&self, kind: MediaKind) -> mpsc::UnboundedSender<u32> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let inbound = Arc::new(MockInbound {
            kind,
            packets: tokio::sync::Mutex::new(receiver),
        });

        let pending = {
            let mut handler = self.handler.lock().unwrap();
            handler.as_mut().map(|handler| handler(inbound))
        };

        if let Some(pending) = pending {
            pending.await;
        }

        sender
    }
}

#[async_trait]
impl PeerConnection for MockConnection {
    type Inbound = MockInbound;
    type Track = MockTrack;

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), TransportError> {
        if sdp == INVALID_SDP {
            return Err(TransportError::InvalidDescription(sdp.to_string()));
        }
        self.remote.lock().unwrap().push((kind, sdp.to_string()));
        Ok(())
    }

    async fn gather_answer(&self) -> Result<String, TransportError> {
        Ok(format!("answer:{} candidates=gathered", self.index))
    }

    async fn gather_offer(&self) -> Result<String, TransportError> {
        Ok(format!(
            "offer:{} candidates=gathered tracks=[{}]",
            self.index,
            self.track_ids().join(",")
        ))
    }

    async fn add_track(&self, track: Arc<MockTrack>) -> Result<(), TransportError> {
        self.add_track_calls.fetch_add(1, Ordering::SeqCst);

        if self.engine.rejected_owner.lock().unwrap().as_ref() == Some(&track.owner) {
            return Err(TransportError::Other(format!("cannot add {}", track.id)));
        }

        self.tracks.lock().unwrap().push(track.id.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        if candidate.candidate == INVALID_CANDIDATE {
            return Err(TransportError::Other("unparseable candidate".to_string()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn on_inbound_track(&self, handler: OnInboundTrackFn<MockInbound>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockInbound {
    kind: MediaKind,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<u32>>,
}

#[async_trait]
impl InboundTrack for MockInbound {
    type Packet = u32;

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn read_packet(&self) -> Result<u32, TransportError> {
        self.packets
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::TrackClosed)
    }
}

pub struct MockTrack {
    pub id: String,
    pub owner: ClientId,
    written: Mutex<Vec<u32>>,
}

impl MockTrack {
    pub fn written(&self) -> Vec<u32> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForwardTrack for MockTrack {
    type Packet = u32;

    fn id(&self) -> &str {
        &self.id
    }

    async fn write_packet(&self, packet: &u32) -> Result<(), TransportError> {
        self.written.lock().unwrap().push(*packet);
        Ok(())
    }
}

/// A connected client as seen from the server side
pub struct TestClient {
    pub id: ClientId,
    pub session: Arc<ClientSession<MockEngine>>,
    inbox: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestClient {
    /// Next queued outbound message, if any
    pub fn next_message(&mut self) -> Option<ServerMessage> {
        self.inbox.try_recv().ok()
    }

    pub fn expect_message(&mut self) -> ServerMessage {
        self.next_message().expect("expected a message for the client")
    }

    pub fn expect_error(&mut self) -> String {
        match self.expect_message() {
            ServerMessage::Error { message } => message,
            other => panic!("Expected Error, got {:?}", other),
        }
    }
}

/// Connect a client and consume its welcome message
pub async fn connect(manager: &Arc<SessionManager<MockEngine>>) -> TestClient {
    let (channel, mut inbox) = ControlChannel::pair();
    let session = manager.on_connect(channel).await;

    let id = match inbox.try_recv() {
        Ok(ServerMessage::Welcome { id }) => id,
        other => panic!("Expected Welcome, got {:?}", other),
    };
    assert_eq!(&id, session.id());

    TestClient { id, session, inbox }
}

/// Wait until `condition` holds, polling for up to a second
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Like [`eventually`] for conditions that need to await
pub async fn eventually_async<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
