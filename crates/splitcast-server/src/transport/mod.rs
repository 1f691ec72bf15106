//! Media transport engine seam
//!
//! Everything below the session layer (ICE, DTLS, SDP negotiation, RTP) is
//! owned by a transport engine. The SFU only talks to it through these traits,
//! so the routing logic can run against webrtc-rs in production and against an
//! in-memory engine in tests.

pub mod rtc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use splitcast_protocol::{ClientId, IceCandidate};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use rtc::RtcEngine;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Role of a connection within a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Receives media from the client
    Publisher,
    /// Sends media to the client
    Subscriber,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Publisher => f.write_str("publisher"),
            ConnectionRole::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Type of a remote session description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("ICE gathering finished without a local description")]
    MissingLocalDescription,

    #[error("Track closed")]
    TrackClosed,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Transport engine error: {0}")]
    Engine(#[from] webrtc::Error),

    #[error("{0}")]
    Other(String),
}

/// Callback fired for every media stream a publisher connection receives
pub type OnInboundTrackFn<T> = Box<dyn FnMut(Arc<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A media stream received from a client
#[async_trait]
pub trait InboundTrack: Send + Sync + 'static {
    type Packet: Send + Sync + 'static;

    fn kind(&self) -> MediaKind;

    /// Read the next raw media unit; an error means the stream is over
    async fn read_packet(&self) -> Result<Self::Packet, TransportError>;
}

/// A local track that relays media units to every connection it was added to
#[async_trait]
pub trait ForwardTrack: Send + Sync + 'static {
    type Packet: Send + Sync + 'static;

    fn id(&self) -> &str;

    async fn write_packet(&self, packet: &Self::Packet) -> Result<(), TransportError>;
}

/// One peer connection owned by a client session
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    type Inbound: InboundTrack;
    type Track: ForwardTrack;

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), TransportError>;

    /// Create an answer, apply it locally and wait for ICE gathering to
    /// complete. Returns the final local SDP with all candidates embedded.
    async fn gather_answer(&self) -> Result<String, TransportError>;

    /// Like [`PeerConnection::gather_answer`], for a locally created offer.
    async fn gather_offer(&self) -> Result<String, TransportError>;

    async fn add_track(&self, track: Arc<Self::Track>) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    fn on_inbound_track(&self, handler: OnInboundTrackFn<Self::Inbound>);

    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for peer connections and forwardable tracks
#[async_trait]
pub trait TransportEngine: Send + Sync + 'static {
    type Packet: Send + Sync + 'static;
    type Inbound: InboundTrack<Packet = Self::Packet>;
    type Track: ForwardTrack<Packet = Self::Packet>;
    type Connection: PeerConnection<Inbound = Self::Inbound, Track = Self::Track>;

    async fn create_connection(
        &self,
        role: ConnectionRole,
    ) -> Result<Arc<Self::Connection>, TransportError>;

    /// Create the track that re-publishes `inbound` on behalf of `owner`
    fn create_forward_track(
        &self,
        owner: &ClientId,
        inbound: &Self::Inbound,
    ) -> Result<Arc<Self::Track>, TransportError>;
}
