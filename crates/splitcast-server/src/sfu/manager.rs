//! Session Manager
//!
//! Owns the session set and the track registry, and wires every published
//! track into the other clients' subscriber connections.

use super::client::{ClientSession, ControlChannel};
use super::forward::forward;
use super::registry::TrackRegistry;
use crate::transport::{ForwardTrack, InboundTrack, TransportEngine};
use splitcast_protocol::{ClientId, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

pub struct SessionManager<E: TransportEngine> {
    engine: E,
    sessions: RwLock<HashMap<ClientId, Arc<ClientSession<E>>>>,
    tracks: TrackRegistry<E::Track>,
}

impl<E: TransportEngine> SessionManager<E> {
    pub fn new(engine: E) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            tracks: TrackRegistry::new(),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn tracks(&self) -> &TrackRegistry<E::Track> {
        &self.tracks
    }

    /// Register a new client and greet it with its id
    pub async fn on_connect(&self, channel: ControlChannel) -> Arc<ClientSession<E>> {
        let session = {
            let mut sessions = self.sessions.write().await;

            let id = loop {
                let id = ClientId::random();
                if !sessions.contains_key(&id) {
                    break id;
                }
            };

            let session = Arc::new(ClientSession::new(id.clone(), channel));
            sessions.insert(id, session.clone());
            session
        };

        tracing::info!("Client {} connected", session.id());

        let welcome = ServerMessage::Welcome {
            id: session.id().clone(),
        };
        if let Err(e) = session.send(welcome) {
            tracing::warn!("Failed to greet client {}: {}", session.id(), e);
        }

        session
    }

    /// Remove a client, its published tracks and both of its connections.
    /// Returns `false` if the client was already gone.
    pub async fn on_disconnect(&self, id: &ClientId) -> bool {
        let Some(session) = self.sessions.write().await.remove(id) else {
            tracing::debug!("Client {} already disconnected", id);
            return false;
        };

        let removed_tracks = self.tracks.remove_all_for(id).await;
        session.release().await;

        tracing::info!(
            "Client {} disconnected, {} tracks unpublished",
            id,
            removed_tracks
        );
        true
    }

    pub async fn session(&self, id: &ClientId) -> Option<Arc<ClientSession<E>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Route one decoded control message to the client's session
    pub async fn dispatch(self: &Arc<Self>, id: &ClientId, message: ClientMessage) {
        let Some(session) = self.session(id).await else {
            tracing::warn!("Message for unknown client {}", id);
            return;
        };

        let result = match message {
            ClientMessage::Publish { sdp } => session.publish(self, &sdp).await,
            ClientMessage::Subscribe => session.subscribe(self).await,
            ClientMessage::Answer { sdp } => session.handle_answer(&sdp).await,
            ClientMessage::Ice { target, candidate } => {
                session.handle_ice(target, candidate).await
            }
            ClientMessage::Unknown => {
                tracing::debug!("Ignoring unknown message type from {}", id);
                Ok(())
            }
        };

        if let Err(e) = result {
            session.report(&e);
        }
    }

    /// Handle a media stream that arrived on `owner`'s publisher connection
    pub(crate) async fn route_inbound(
        &self,
        owner: ClientId,
        inbound: Arc<E::Inbound>,
        stop: watch::Receiver<bool>,
    ) {
        let kind = inbound.kind();
        tracing::info!("Received {} track from {}", kind, owner);

        if *stop.borrow() {
            tracing::debug!("Publisher of {} already released, ignoring {} track", owner, kind);
            return;
        }

        let track = match self.engine.create_forward_track(&owner, &inbound) {
            Ok(track) => track,
            Err(e) => {
                tracing::error!("Failed to create forward track for {}: {}", owner, e);
                return;
            }
        };

        // `stop` is re-read under the registry write lock
        let registered = self
            .tracks
            .register_if(owner.clone(), kind, track.clone(), || !*stop.borrow())
            .await;
        if !registered {
            tracing::debug!("Publisher of {} released before its {} track was stored", owner, kind);
            return;
        }

        // The client may have left while the track was being set up
        if !self.sessions.read().await.contains_key(&owner) {
            self.tracks.remove_all_for(&owner).await;
            return;
        }

        // Or re-published; its replacement may already hold the slot
        if *stop.borrow() {
            self.tracks.unregister(&owner, kind, &track).await;
            tracing::debug!("Publisher of {} released, skipping fan-out of {} track", owner, kind);
            return;
        }

        let added = self.fan_out(&owner, &track).await;
        tracing::info!(
            "Stored {} track of {}, added to {} subscribers",
            kind,
            owner,
            added
        );

        tokio::spawn(forward(owner, inbound, track, stop));
    }

    /// Add `track` to every other session that has a subscriber connection
    async fn fan_out(&self, owner: &ClientId, track: &Arc<E::Track>) -> usize {
        // Snapshot first: session locks are taken one at a time, never while
        // holding the session set lock
        let others: Vec<Arc<ClientSession<E>>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.id() != owner)
            .cloned()
            .collect();

        let mut added = 0;
        for session in others {
            match session.attach_track(track).await {
                Ok(true) => {
                    added += 1;
                    tracing::debug!("Added {} to subscriber of {}", track.id(), session.id());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to add {} to subscriber of {}: {}",
                        track.id(),
                        session.id(),
                        e
                    );
                }
            }
        }

        added
    }
}
