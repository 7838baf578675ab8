//! Per-peer connection lifecycle driven by signaling messages
//!
//! Per peer id: `NONE -> CONNECTING -> CONNECTED -> CLOSED`.
//!
//! Role rule: the side that discovers an existing member in a `peers`
//! snapshot is the offerer toward it. `peer-joined` and an inbound `offer`
//! make this side the answerer, and an answerer never offers for that id.
//! Glare therefore cannot happen between two well-behaved clients.

use super::{CallEvent, CallSession, PeerView};
use crate::media::{RemoteMedia, RemoteTrack};
use crate::peer::{
    ConnectionEvents, LinkPhase, LinkState, MediaConnection, NegotiationRole, NegotiationState,
    PeerMetadata,
};
use crate::signaling::{
    IceCandidate, InboundMessage, OutboundMessage, PeerSummary, RecordingStatus, SdpType,
    SessionDescription,
};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl CallSession {
    pub(crate) async fn handle_signal(&mut self, msg: InboundMessage) {
        debug!("Handling {} message", msg.kind());

        match msg {
            InboundMessage::Peers { peers, owner_uid } => self.handle_peers(peers, owner_uid).await,
            InboundMessage::PeerJoined(peer) => self.handle_peer_joined(peer).await,
            InboundMessage::PeerInfo(peer) => self.handle_peer_info(peer),
            InboundMessage::OwnerSet { owner_uid } => self.handle_owner_set(owner_uid),
            InboundMessage::Offer { from, data } => self.handle_offer(&from, data).await,
            InboundMessage::Answer { from, data } => self.handle_answer(&from, data).await,
            InboundMessage::Ice { from, data } => self.handle_ice(&from, data).await,
            InboundMessage::PeerLeft { id } | InboundMessage::Bye { id } => {
                self.remove_peer(&id).await;
            }
            InboundMessage::Error { message } => {
                warn!("Server error: {}", message);
                self.emit(CallEvent::ServerError(message));
            }
            InboundMessage::RecordStart(notice) => {
                self.set_recording(RecordingStatus::Start, notice.timestamp)
            }
            InboundMessage::RecordPause(notice) => {
                self.set_recording(RecordingStatus::Pause, notice.timestamp)
            }
            InboundMessage::RecordResume(notice) => {
                self.set_recording(RecordingStatus::Resume, notice.timestamp)
            }
            InboundMessage::RecordStop(notice) => {
                self.set_recording(RecordingStatus::Stop, notice.timestamp)
            }
            InboundMessage::Unknown { kind } => debug!("Ignoring signaling message type {}", kind),
            InboundMessage::Malformed { reason } => {
                warn!("Ignoring malformed signaling message: {}", reason)
            }
        }
    }

    /// Room snapshot: we are the late joiner and offer to everyone listed
    async fn handle_peers(&mut self, peers: Vec<PeerSummary>, owner_uid: String) {
        if !owner_uid.is_empty() {
            self.set_owner(owner_uid);
        }

        for peer in peers {
            if peer.id.is_empty() {
                debug!("Skipping snapshot entry without id");
                continue;
            }
            self.upsert_peer(&peer.id, PeerMetadata::from(&peer));

            if let Err(e) = self.offer_to(&peer.id).await {
                warn!("Failed to offer to peer {}: {}", peer.id, e);
            }
        }
    }

    /// A newcomer will offer to us; only prepare the connection
    async fn handle_peer_joined(&mut self, peer: PeerSummary) {
        if peer.id.is_empty() {
            debug!("Ignoring peer-joined without id");
            return;
        }
        self.upsert_peer(&peer.id, PeerMetadata::from(&peer));

        if let Err(e) = self.ensure_connection(&peer.id, NegotiationRole::Answerer).await {
            warn!("Failed to prepare connection for peer {}: {}", peer.id, e);
        }
    }

    /// Metadata refresh; never touches connections
    fn handle_peer_info(&mut self, peer: PeerSummary) {
        if peer.id.is_empty() {
            debug!("Ignoring peer-info without id");
            return;
        }
        self.upsert_peer(&peer.id, PeerMetadata::from(&peer));

        if self.stage.staged().peer_id() == Some(peer.id.as_str()) {
            self.emit_stage();
        }
    }

    fn handle_owner_set(&mut self, owner_uid: String) {
        self.set_owner(owner_uid.clone());

        if self.identity.adopt_owner_uid(&owner_uid) {
            info!("Adopted owner uid {} as local user id", owner_uid);
            self.emit(CallEvent::LocalIdentityResolved {
                user_id: self.identity.user_id.clone(),
                chat_id: self.identity.chat_id.clone(),
            });
        }
    }

    async fn handle_offer(&mut self, from: &str, offer: SessionDescription) {
        if from.is_empty() {
            warn!("Ignoring offer without sender");
            return;
        }
        if offer.kind != SdpType::Offer {
            warn!("Ignoring offer message from {} carrying {:?}", from, offer.kind);
            return;
        }
        if !self.registry.contains(from) {
            self.upsert_peer(from, PeerMetadata::default());
        }

        if let Err(e) = self.answer_offer(from, offer).await {
            warn!("Failed to answer offer from {}: {}", from, e);
        }
    }

    async fn answer_offer(&mut self, from: &str, offer: SessionDescription) -> Result<()> {
        let connection = self.ensure_connection(from, NegotiationRole::Answerer).await?;
        let answer = connection.accept_offer(offer).await?;

        self.signaling.send(&OutboundMessage::Answer {
            to: from.to_string(),
            data: answer,
        });
        debug!("Sent answer to {}", from);
        Ok(())
    }

    /// Applied only while our offer is pending; anything else is a no-op
    async fn handle_answer(&mut self, from: &str, answer: SessionDescription) {
        if answer.kind != SdpType::Answer {
            warn!("Ignoring answer message from {} carrying {:?}", from, answer.kind);
            return;
        }
        let Some(connection) = self.connection_of(from) else {
            debug!("Ignoring answer from unknown peer {}", from);
            return;
        };

        let state = connection.signaling_state();
        if state != NegotiationState::HaveLocalOffer {
            debug!("Ignoring answer from {} in state {:?}", from, state);
            return;
        }

        if let Err(e) = connection.apply_answer(answer).await {
            warn!("Failed to apply answer from {}: {}", from, e);
        }
    }

    async fn handle_ice(&mut self, from: &str, candidate: IceCandidate) {
        let Some(connection) = self.connection_of(from) else {
            debug!("Ignoring ICE candidate for unknown peer {}", from);
            return;
        };

        if let Err(e) = connection.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate from {}: {}", from, e);
        }
    }

    /// Remove a peer, closing its connection once; returns false if unknown
    pub(crate) async fn remove_peer(&mut self, peer_id: &str) -> bool {
        let Some(entry) = self.registry.remove(peer_id) else {
            debug!("Departure of unknown peer {}", peer_id);
            return false;
        };

        if let Some(connection) = entry.connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection to {}: {}", peer_id, e);
            }
        }
        info!("Peer {} left", peer_id);

        if self.stage.on_peer_removed(peer_id) {
            self.emit_stage();
        }
        self.emit(CallEvent::PeerRemoved {
            peer_id: peer_id.to_string(),
        });
        self.maybe_stop_timer_if_alone();
        true
    }

    /// Return the peer's connection, creating it on first need
    pub(crate) async fn ensure_connection(
        &mut self,
        peer_id: &str,
        role: NegotiationRole,
    ) -> Result<Arc<dyn MediaConnection>> {
        if let Some(connection) = self.connection_of(peer_id) {
            return Ok(connection);
        }
        if !self.registry.contains(peer_id) {
            self.upsert_peer(peer_id, PeerMetadata::default());
        }

        let events = ConnectionEvents::new(peer_id, self.events_tx.clone());
        let connection = self.factory.create(events).await?;

        if let Some(stream) = self.media.outgoing_stream() {
            if let Err(e) = connection.attach_local_tracks(&stream).await {
                let _ = connection.close().await;
                return Err(e);
            }
        }

        if let Some(entry) = self.registry.get_mut(peer_id) {
            entry.connection = Some(Arc::clone(&connection));
            entry.role = Some(role);
            entry.link = LinkPhase::Connecting;
        }
        info!(
            "Connection to {} created as {:?} (connection_id={})",
            peer_id,
            role,
            connection.connection_id()
        );

        Ok(connection)
    }

    async fn offer_to(&mut self, peer_id: &str) -> Result<()> {
        let connection = self.ensure_connection(peer_id, NegotiationRole::Offerer).await?;

        if self.registry.get(peer_id).and_then(|e| e.role) == Some(NegotiationRole::Answerer) {
            debug!("Not offering to {}: this side answers", peer_id);
            return Ok(());
        }

        let offer = connection.create_offer().await?;
        self.signaling.send(&OutboundMessage::Offer {
            to: peer_id.to_string(),
            data: offer,
        });
        debug!("Sent offer to {}", peer_id);
        Ok(())
    }

    pub(crate) fn handle_local_candidate(
        &mut self,
        peer_id: &str,
        connection_id: Uuid,
        candidate: IceCandidate,
    ) {
        if !self.is_current(peer_id, connection_id) {
            debug!("Dropping candidate from stale connection to {}", peer_id);
            return;
        }

        self.signaling.send(&OutboundMessage::Ice {
            to: peer_id.to_string(),
            data: candidate,
        });
    }

    pub(crate) fn handle_remote_track(
        &mut self,
        peer_id: &str,
        connection_id: Uuid,
        track: RemoteTrack,
    ) {
        if !self.is_current(peer_id, connection_id) {
            debug!("Dropping track from stale connection to {}", peer_id);
            return;
        }
        let Some(entry) = self.registry.get_mut(peer_id) else {
            return;
        };

        debug!(
            "Remote {:?} track {} from {} (stream {})",
            track.kind, track.id, peer_id, track.stream_id
        );
        let media = RemoteMedia::apply(entry.remote_media.take(), track);
        entry.remote_media = Some(media.clone());
        if entry.link == LinkPhase::Connecting {
            entry.link = LinkPhase::Connected;
            info!("Peer {} connected", peer_id);
        }

        self.emit(CallEvent::TrackUpdated {
            peer_id: peer_id.to_string(),
            media,
        });
        if self.stage.staged().peer_id() == Some(peer_id) {
            self.emit_stage();
        }
    }

    pub(crate) fn handle_link_state(&mut self, peer_id: &str, connection_id: Uuid, state: LinkState) {
        if !self.is_current(peer_id, connection_id) {
            return;
        }
        if let Some(entry) = self.registry.get_mut(peer_id) {
            entry.link_state = state;
        }

        match state {
            LinkState::Failed => warn!("Connection to {} failed", peer_id),
            LinkState::Disconnected => warn!("Connection to {} interrupted", peer_id),
            _ => debug!("Connection to {} is {:?}", peer_id, state),
        }
    }

    fn set_owner(&mut self, owner_uid: String) {
        let changed = self.owner_uid != owner_uid;
        self.owner_uid = owner_uid;
        self.registry.recompute_ownership(&self.owner_uid);

        if changed {
            info!("Room owner is now {:?}", self.owner_uid);
            self.emit(CallEvent::OwnerChanged {
                owner_uid: self.owner_uid.clone(),
            });
        }
    }

    fn upsert_peer(&mut self, peer_id: &str, meta: PeerMetadata) {
        let created = self.registry.upsert(peer_id, meta, &self.owner_uid);
        let Some(entry) = self.registry.get(peer_id) else {
            return;
        };

        let view = PeerView::from(entry);
        if created {
            info!("Peer {} added", peer_id);
            self.emit(CallEvent::PeerAdded(view));
            self.maybe_restart_timer();
        } else {
            self.emit(CallEvent::PeerUpdated(view));
        }
    }

    fn connection_of(&self, peer_id: &str) -> Option<Arc<dyn MediaConnection>> {
        self.registry.get(peer_id).and_then(|e| e.connection.clone())
    }

    fn is_current(&self, peer_id: &str, connection_id: Uuid) -> bool {
        self.registry
            .get(peer_id)
            .and_then(|e| e.connection_id())
            == Some(connection_id)
    }
}
