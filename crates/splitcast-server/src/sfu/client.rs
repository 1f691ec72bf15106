//! Client Session
//!
//! Per-client state: one publisher connection (client → server), one
//! subscriber connection (server → client) and the outbound half of the
//! control channel. All connection changes go through the session lock.

use super::SessionManager;
use crate::error::{Result, SessionError};
use crate::transport::{
    ConnectionRole, OnInboundTrackFn, PeerConnection, SdpKind, TransportEngine,
};
use futures_util::FutureExt;
use splitcast_protocol::{ClientId, IceCandidate, IceTarget, ServerMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Outbound side of a client's signaling transport
#[derive(Debug)]
pub struct ControlChannel {
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ControlChannel {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { sender }
    }

    /// Channel paired with the receiver its messages are delivered to
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| SessionError::ChannelClosed)
    }
}

struct PublisherLink<C> {
    connection: Arc<C>,
    /// Tells this connection's forwarding loops to exit
    stop: watch::Sender<bool>,
}

impl<C: PeerConnection> PublisherLink<C> {
    async fn release(self, owner: &ClientId) {
        let _ = self.stop.send(true);
        if let Err(e) = self.connection.close().await {
            tracing::warn!("Error closing publisher connection of {}: {}", owner, e);
        }
    }
}

struct SubscriberLink<C: PeerConnection> {
    connection: Arc<C>,
    /// Forward tracks already added to this connection
    attached: Vec<Arc<C::Track>>,
}

impl<C: PeerConnection> SubscriberLink<C> {
    /// Add a track unless it is already attached. Returns whether it was added.
    async fn attach(&mut self, track: &Arc<C::Track>) -> Result<bool> {
        if self.attached.iter().any(|attached| Arc::ptr_eq(attached, track)) {
            return Ok(false);
        }

        self.connection.add_track(track.clone()).await?;
        self.attached.push(track.clone());
        Ok(true)
    }

    async fn release(self, owner: &ClientId) {
        if let Err(e) = self.connection.close().await {
            tracing::warn!("Error closing subscriber connection of {}: {}", owner, e);
        }
    }
}

struct Links<C: PeerConnection> {
    publisher: Option<PublisherLink<C>>,
    subscriber: Option<SubscriberLink<C>>,
}

pub struct ClientSession<E: TransportEngine> {
    id: ClientId,
    channel: ControlChannel,
    links: Mutex<Links<E::Connection>>,
}

impl<E: TransportEngine> ClientSession<E> {
    pub(crate) fn new(id: ClientId, channel: ControlChannel) -> Self {
        Self {
            id,
            channel,
            links: Mutex::new(Links {
                publisher: None,
                subscriber: None,
            }),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.channel.send(message)
    }

    pub async fn has_publisher(&self) -> bool {
        self.links.lock().await.publisher.is_some()
    }

    pub async fn has_subscriber(&self) -> bool {
        self.links.lock().await.subscriber.is_some()
    }

    /// Log an error and tell the client about it
    pub fn report(&self, error: &SessionError) {
        tracing::warn!("Client {}: {}", self.id, error);

        if error.is_reportable() {
            let _ = self.channel.send(ServerMessage::Error {
                message: error.to_string(),
            });
        }
    }

    /// Answer a publisher offer, replacing any previous publisher connection
    pub async fn publish(&self, manager: &Arc<SessionManager<E>>, sdp: &str) -> Result<()> {
        let mut links = self.links.lock().await;

        if let Some(previous) = links.publisher.take() {
            tracing::info!("Client {} replaces its publisher connection", self.id);
            previous.release(&self.id).await;
        }

        let connection = manager
            .engine()
            .create_connection(ConnectionRole::Publisher)
            .await?;

        let (stop, stop_rx) = watch::channel(false);
        connection.on_inbound_track(self.inbound_track_handler(manager, stop_rx));

        links.publisher = Some(PublisherLink {
            connection: connection.clone(),
            stop,
        });

        let negotiated = async {
            connection
                .set_remote_description(SdpKind::Offer, sdp)
                .await?;
            connection.gather_answer().await
        }
        .await;

        let answer = match negotiated {
            Ok(answer) => answer,
            Err(e) => {
                // Leave no half-negotiated publisher behind
                if let Some(failed) = links.publisher.take() {
                    failed.release(&self.id).await;
                }
                return Err(e.into());
            }
        };

        drop(links);

        tracing::info!("Publisher of {} established", self.id);
        self.send(ServerMessage::PublishAnswer { sdp: answer })
    }

    fn inbound_track_handler(
        &self,
        manager: &Arc<SessionManager<E>>,
        stop: watch::Receiver<bool>,
    ) -> OnInboundTrackFn<E::Inbound> {
        let manager = Arc::downgrade(manager);
        let owner = self.id.clone();

        Box::new(move |inbound| {
            let manager = manager.clone();
            let owner = owner.clone();
            let stop = stop.clone();

            async move {
                if let Some(manager) = manager.upgrade() {
                    manager.route_inbound(owner, inbound, stop).await;
                }
            }
            .boxed()
        })
    }

    /// Offer a fresh subscriber connection carrying every other client's tracks
    pub async fn subscribe(&self, manager: &Arc<SessionManager<E>>) -> Result<()> {
        let mut links = self.links.lock().await;

        if let Some(previous) = links.subscriber.take() {
            tracing::info!("Client {} replaces its subscriber connection", self.id);
            previous.release(&self.id).await;
        }

        let connection = manager
            .engine()
            .create_connection(ConnectionRole::Subscriber)
            .await?;

        let mut link = SubscriberLink {
            connection: connection.clone(),
            attached: Vec::new(),
        };

        let snapshot = manager.tracks().all_except(&self.id).await;
        for entry in &snapshot {
            if let Err(e) = link.attach(&entry.track).await {
                tracing::warn!(
                    "Failed to add {} track from {} to subscriber of {}: {}",
                    entry.kind,
                    entry.owner,
                    self.id,
                    e
                );
            }
        }

        let track_count = link.attached.len();
        if track_count == 0 {
            tracing::info!("No tracks available for {} yet", self.id);
        } else {
            tracing::info!("Subscriber of {} carries {} tracks", self.id, track_count);
        }

        links.subscriber = Some(link);

        let offer = match connection.gather_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                if let Some(failed) = links.subscriber.take() {
                    failed.release(&self.id).await;
                }
                return Err(e.into());
            }
        };

        drop(links);

        tracing::info!("Subscriber offer for {} ready", self.id);
        self.send(ServerMessage::SubscribeOffer { sdp: offer })
    }

    /// Apply the client's answer to the subscriber offer
    pub async fn handle_answer(&self, sdp: &str) -> Result<()> {
        let links = self.links.lock().await;

        let Some(subscriber) = &links.subscriber else {
            return Err(SessionError::NoSubscriber);
        };

        subscriber
            .connection
            .set_remote_description(SdpKind::Answer, sdp)
            .await?;

        tracing::info!("Subscriber answer of {} applied", self.id);
        Ok(())
    }

    /// Add a remote ICE candidate. Candidates for a connection that does not
    /// exist yet are dropped.
    pub async fn handle_ice(&self, target: IceTarget, candidate: IceCandidate) -> Result<()> {
        let links = self.links.lock().await;

        let connection = match target {
            IceTarget::Publish => links.publisher.as_ref().map(|link| &link.connection),
            IceTarget::Subscribe => links.subscriber.as_ref().map(|link| &link.connection),
        };

        let Some(connection) = connection else {
            tracing::debug!(
                "Dropping {} ICE candidate from {}: no connection yet",
                target,
                self.id
            );
            return Ok(());
        };

        connection.add_ice_candidate(candidate).await?;
        tracing::debug!("ICE candidate added to {} connection of {}", target, self.id);
        Ok(())
    }

    /// Add another client's track to this session's subscriber connection.
    /// Returns `false` when there is no subscriber connection or the track is
    /// already attached.
    pub(crate) async fn attach_track(&self, track: &Arc<E::Track>) -> Result<bool> {
        let mut links = self.links.lock().await;

        match links.subscriber.as_mut() {
            Some(subscriber) => subscriber.attach(track).await,
            None => Ok(false),
        }
    }

    /// Tear down both connections
    pub(crate) async fn release(&self) {
        let mut links = self.links.lock().await;

        if let Some(publisher) = links.publisher.take() {
            publisher.release(&self.id).await;
        }
        if let Some(subscriber) = links.subscriber.take() {
            subscriber.release(&self.id).await;
        }
    }
}
