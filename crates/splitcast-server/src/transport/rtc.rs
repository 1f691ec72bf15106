//! webrtc-rs transport engine
//!
//! Uses `TrackLocalStaticRTP` for forwarding so that RTP packets are relayed
//! untouched, preserving the publisher's packetization.

use super::{
    ConnectionRole, ForwardTrack, InboundTrack, MediaKind, OnInboundTrackFn, PeerConnection,
    SdpKind, TransportEngine, TransportError,
};
use crate::state::Config;
use async_trait::async_trait;
use futures_util::FutureExt;
use splitcast_protocol::{ClientId, IceCandidate};
use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// Transport engine backed by webrtc-rs
pub struct RtcEngine {
    /// WebRTC API (shared for all connections)
    api: API,
    /// ICE servers handed to every new connection
    ice_servers: Vec<RTCIceServer>,
}

impl RtcEngine {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        // Publishers may send any of the default codecs; they are forwarded as-is
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        if let Some(host) = &config.public_host {
            // Advertise the public address as a host candidate for clients behind NAT
            setting_engine.set_nat_1to1_ips(vec![host.clone()], RTCIceCandidateType::Host);
            tracing::info!("Advertising {} as host candidate address", host);
        }

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = config
            .ice_servers()
            .into_iter()
            .map(|server| RTCIceServer {
                urls: server.urls,
                username: server.username.unwrap_or_default(),
                credential: server.credential.unwrap_or_default(),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        tracing::info!("ICE servers: {} configured", ice_servers.len());

        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl TransportEngine for RtcEngine {
    type Packet = Packet;
    type Inbound = RtcInboundTrack;
    type Track = RtcForwardTrack;
    type Connection = RtcConnection;

    async fn create_connection(
        &self,
        role: ConnectionRole,
    ) -> Result<Arc<RtcConnection>, TransportError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let peer_connection = self.api.new_peer_connection(config).await?;

        Ok(Arc::new(RtcConnection {
            peer_connection,
            role,
        }))
    }

    fn create_forward_track(
        &self,
        owner: &ClientId,
        inbound: &RtcInboundTrack,
    ) -> Result<Arc<RtcForwardTrack>, TransportError> {
        let capability = inbound.track.codec().capability;
        if capability.mime_type.is_empty() {
            return Err(TransportError::UnsupportedCodec(format!(
                "{} track from {} has no negotiated codec",
                inbound.kind, owner
            )));
        }

        let id = format!("track-{}-{}", owner, inbound.kind);
        let local = Arc::new(TrackLocalStaticRTP::new(
            capability,
            id.clone(),
            format!("stream-{}", owner),
        ));

        Ok(Arc::new(RtcForwardTrack { local, id }))
    }
}

/// Remote track received on a publisher connection
pub struct RtcInboundTrack {
    track: Arc<TrackRemote>,
    kind: MediaKind,
}

#[async_trait]
impl InboundTrack for RtcInboundTrack {
    type Packet = Packet;

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn read_packet(&self) -> Result<Packet, TransportError> {
        let (packet, _attributes) = self.track.read_rtp().await?;
        Ok(packet)
    }
}

/// Local RTP track relaying one publisher stream
pub struct RtcForwardTrack {
    local: Arc<TrackLocalStaticRTP>,
    id: String,
}

#[async_trait]
impl ForwardTrack for RtcForwardTrack {
    type Packet = Packet;

    fn id(&self) -> &str {
        &self.id
    }

    async fn write_packet(&self, packet: &Packet) -> Result<(), TransportError> {
        self.local.write_rtp(packet).await?;
        Ok(())
    }
}

pub struct RtcConnection {
    peer_connection: RTCPeerConnection,
    role: ConnectionRole,
}

impl RtcConnection {
    /// Apply a local description and wait until candidate gathering is done
    async fn gather(&self, description: RTCSessionDescription) -> Result<String, TransportError> {
        let mut gathering_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(description).await?;
        let _ = gathering_complete.recv().await;

        tracing::debug!("{} ICE gathering complete", self.role);

        self.peer_connection
            .local_description()
            .await
            .map(|description| description.sdp)
            .ok_or(TransportError::MissingLocalDescription)
    }
}

#[async_trait]
impl PeerConnection for RtcConnection {
    type Inbound = RtcInboundTrack;
    type Track = RtcForwardTrack;

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), TransportError> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp.to_string()),
            SdpKind::Answer => RTCSessionDescription::answer(sdp.to_string()),
        }
        .map_err(|e| TransportError::InvalidDescription(e.to_string()))?;

        self.peer_connection.set_remote_description(description).await?;
        Ok(())
    }

    async fn gather_answer(&self) -> Result<String, TransportError> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.gather(answer).await
    }

    async fn gather_offer(&self) -> Result<String, TransportError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.gather(offer).await
    }

    async fn add_track(&self, track: Arc<RtcForwardTrack>) -> Result<(), TransportError> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.local.clone();
        let rtp_sender = self.peer_connection.add_track(local).await?;

        // Interceptors only run while RTCP is being read from the sender
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let candidate = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    fn on_inbound_track(&self, mut handler: OnInboundTrackFn<RtcInboundTrack>) {
        let role = self.role;
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    RTPCodecType::Video => MediaKind::Video,
                    RTPCodecType::Unspecified => {
                        tracing::warn!("Ignoring {} track {} of unspecified kind", role, track.id());
                        return async {}.boxed();
                    }
                };

                handler(Arc::new(RtcInboundTrack { track, kind }))
            }));
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
