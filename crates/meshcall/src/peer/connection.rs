//! Negotiated media connection to one remote peer

use crate::config::CallConfig;
use crate::media::{LocalStream, LocalTrack, RemoteTrack, TrackKind};
use crate::session::SessionEvent;
use crate::signaling::{IceCandidate, SdpType, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

/// Transport state reported by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, ICE not started
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media path established
    Connected,
    /// Temporarily lost
    Disconnected,
    /// ICE failed
    Failed,
    /// Closed
    Closed,
}

/// Offer/answer state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No exchange in progress
    Stable,
    /// Local offer sent, waiting for an answer
    HaveLocalOffer,
    /// Remote offer applied, local answer pending
    HaveRemoteOffer,
    /// Connection closed
    Closed,
    /// Provisional answers or unspecified
    Other,
}

/// Callback surface handed to a connection at construction
///
/// Every event is tagged with the peer id and the connection id so the
/// session can drop events from connections it already replaced or closed.
#[derive(Clone)]
pub struct ConnectionEvents {
    peer_id: String,
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ConnectionEvents {
    /// Create the event surface for a new connection to `peer_id`
    pub fn new(peer_id: &str, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            connection_id: Uuid::new_v4(),
            tx,
        }
    }

    /// Remote peer id
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Id of the connection these events belong to
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// A local ICE candidate was gathered
    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(SessionEvent::LocalCandidate {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id,
            candidate,
        });
    }

    /// A remote track arrived
    pub fn remote_track(&self, track: RemoteTrack) {
        self.emit(SessionEvent::RemoteTrack {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id,
            track,
        });
    }

    /// The transport state changed
    pub fn state_changed(&self, state: LinkState) {
        self.emit(SessionEvent::LinkStateChanged {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id,
            state,
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session gone, dropping event for peer {}", self.peer_id);
        }
    }
}

/// A negotiated media connection with one peer
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Remote peer id
    fn peer_id(&self) -> &str;

    /// Unique id of this connection instance
    fn connection_id(&self) -> Uuid;

    /// Attach the local audio track and current outgoing video track
    async fn attach_local_tracks(&self, stream: &LocalStream) -> Result<()>;

    /// Create an offer and apply it locally
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply a remote offer and produce (and apply) the local answer
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Apply the remote answer to our pending offer
    async fn apply_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Swap the outgoing video track in place, without renegotiation
    async fn replace_video_track(&self, track: &Arc<LocalTrack>) -> Result<()>;

    /// Current offer/answer state
    fn signaling_state(&self) -> NegotiationState;

    /// Close the connection and release its tracks
    async fn close(&self) -> Result<()>;
}

/// Creates connections on behalf of the session
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection whose callbacks report through `events`
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>>;
}

/// webrtc-rs backed connection
pub struct RtcPeerConnection {
    peer_id: String,
    connection_id: Uuid,
    peer_connection: Arc<RTCPeerConnection>,
    audio_sender: RwLock<Option<Arc<RTCRtpSender>>>,
    video_sender: RwLock<Option<Arc<RTCRtpSender>>>,
}

impl RtcPeerConnection {
    /// Create a peer connection using the ICE servers of `config`
    #[instrument(skip(config, events), fields(peer_id = %events.peer_id()))]
    pub async fn new(config: &CallConfig, events: ConnectionEvents) -> Result<Self> {
        let peer_id = events.peer_id().to_string();
        let connection_id = events.connection_id();

        info!(
            "Creating peer connection: peer_id={}, connection_id={}",
            peer_id, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let ice_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            let events = ice_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => events.local_candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));

        let track_events = events.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                events.remote_track(RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                });
            })
        }));

        let state_events = events;
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => LinkState::New,
                        RTCPeerConnectionState::Connecting => LinkState::Connecting,
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkState::Failed,
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                        _ => return,
                    };
                    events.state_changed(state);
                })
            },
        ));

        Ok(Self {
            peer_id,
            connection_id,
            peer_connection,
            audio_sender: RwLock::new(None),
            video_sender: RwLock::new(None),
        })
    }

    async fn local_description(&self, kind: SdpType) -> Result<SessionDescription> {
        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after setting it".to_string()))?;

        Ok(SessionDescription {
            kind,
            sdp: local_desc.sdp,
        })
    }

    async fn attach(
        &self,
        slot: &RwLock<Option<Arc<RTCRtpSender>>>,
        track: &Arc<LocalTrack>,
    ) -> Result<()> {
        let mut sender = slot.write().await;
        match sender.as_ref() {
            Some(existing) => existing
                .replace_track(Some(track.rtc_track()))
                .await
                .map_err(|e| Error::MediaTrackError(format!("Failed to replace track: {}", e))),
            None => {
                let added = self
                    .peer_connection
                    .add_track(track.rtc_track())
                    .await
                    .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;
                *sender = Some(added);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MediaConnection for RtcPeerConnection {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    async fn attach_local_tracks(&self, stream: &LocalStream) -> Result<()> {
        if let Some(audio) = &stream.audio {
            self.attach(&self.audio_sender, audio).await?;
        }
        if let Some(video) = &stream.video {
            self.attach(&self.video_sender, video).await?;
        }
        debug!("Attached local tracks for peer {}", self.peer_id);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP offer for peer {}", self.peer_id);
        self.local_description(SdpType::Offer).await
    }

    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let offer = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP answer for peer {}", self.peer_id);
        self.local_description(SdpType::Answer).await
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn replace_video_track(&self, track: &Arc<LocalTrack>) -> Result<()> {
        let sender = self.video_sender.read().await;
        let sender = sender.as_ref().ok_or_else(|| {
            Error::MediaTrackError(format!("No video sender for peer {}", self.peer_id))
        })?;

        sender
            .replace_track(Some(track.rtc_track()))
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to replace video track: {}", e)))
    }

    fn signaling_state(&self) -> NegotiationState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::Stable => NegotiationState::Stable,
            RTCSignalingState::HaveLocalOffer => NegotiationState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => NegotiationState::HaveRemoteOffer,
            RTCSignalingState::Closed => NegotiationState::Closed,
            _ => NegotiationState::Other,
        }
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection for peer {}", self.peer_id);

        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}

/// Builds [`RtcPeerConnection`]s from the call configuration
pub struct WebRtcConnectionFactory {
    config: Arc<CallConfig>,
}

impl WebRtcConnectionFactory {
    /// Create a factory using the ICE servers of `config`
    pub fn new(config: Arc<CallConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>> {
        let connection = RtcPeerConnection::new(&self.config, events).await?;
        Ok(Arc::new(connection))
    }
}
