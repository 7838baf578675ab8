//! Call session: the single-writer event loop
//!
//! All state of a call (peer registry, owner uid, stage, local media) lives in
//! one [`CallSession`] owned by one task. The signaling channel, connection
//! callbacks and user commands only enqueue [`SessionEvent`]s; the loop
//! applies them strictly one at a time, so the "at most one connection per
//! peer id" invariant needs no locking.
//!
//! Protocol message handling lives in [`lifecycle`], stage state in
//! [`stage`].

pub mod events;
pub mod handle;
pub mod lifecycle;
pub mod stage;

pub use events::{
    AudioSource, CallEvent, PeerView, RecordingSources, SessionCommand, SessionEvent,
    SessionQuery, StageSource,
};
pub use handle::{join, JoinedCall, SessionHandle};
pub use stage::{StageMeta, StageSelector, StageTarget};

use crate::identity::Identity;
use crate::media::{LocalStream, LocalTrack, MediaController};
use crate::peer::{ConnectionFactory, PeerRegistry};
use crate::signaling::{OutboundMessage, RecordingStatus, SignalingSink};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where the session is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Joined and processing events
    Joined,
    /// The signaling channel closed under us
    Disconnected,
    /// The local user hung up
    Left,
}

/// State of one call, mutated only by its own event loop
pub struct CallSession {
    identity: Identity,
    owner_uid: String,
    registry: PeerRegistry,
    stage: StageSelector,
    media: MediaController,
    signaling: Arc<dyn SignalingSink>,
    factory: Arc<dyn ConnectionFactory>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    call_events: mpsc::UnboundedSender<CallEvent>,
    recording: Option<RecordingStatus>,
    call_started_at: Option<Instant>,
    phase: SessionPhase,
}

impl CallSession {
    /// Create a session
    ///
    /// `events_tx` must feed the receiver later passed to [`CallSession::run`];
    /// connections and screen-share watchers report through it. Returns the
    /// session and the receiver of rendering notifications.
    pub fn new(
        identity: Identity,
        signaling: Arc<dyn SignalingSink>,
        factory: Arc<dyn ConnectionFactory>,
        media: MediaController,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (call_events, call_events_rx) = mpsc::unbounded_channel();

        let session = Self {
            identity,
            owner_uid: String::new(),
            registry: PeerRegistry::new(),
            stage: StageSelector::new(),
            media,
            signaling,
            factory,
            events_tx,
            call_events,
            recording: None,
            call_started_at: None,
            phase: SessionPhase::Joined,
        };

        (session, call_events_rx)
    }

    /// Announce the local identity and start the call timer
    pub fn start(&mut self) {
        let uid = (!self.identity.user_id.is_empty()).then(|| self.identity.user_id.clone());
        self.signaling.send(&OutboundMessage::Hello {
            name: self.identity.display_name.clone(),
            uid,
            avatar: self.identity.avatar_url.clone(),
            is_owner: self.identity.is_owner_by_link,
            info: self.identity.info.clone(),
        });
        info!(
            "Joined room as {} (uid={})",
            self.identity.display_name,
            if self.identity.user_id.is_empty() {
                "(empty)"
            } else {
                self.identity.user_id.as_str()
            }
        );

        self.start_call_timer();
        self.emit_stage();
    }

    /// Drain the event queue until the call ends
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
            if self.phase != SessionPhase::Joined {
                break;
            }
        }

        self.media.release_all();
        debug!("Session loop terminated");
    }

    /// Apply one event
    pub async fn handle_event(&mut self, event: SessionEvent) {
        if self.phase != SessionPhase::Joined {
            debug!("Session over, ignoring {:?}", event);
            return;
        }

        match event {
            SessionEvent::Signal(msg) => self.handle_signal(msg).await,
            SessionEvent::ChannelClosed => self.handle_channel_closed().await,
            SessionEvent::LocalCandidate {
                peer_id,
                connection_id,
                candidate,
            } => self.handle_local_candidate(&peer_id, connection_id, candidate),
            SessionEvent::RemoteTrack {
                peer_id,
                connection_id,
                track,
            } => self.handle_remote_track(&peer_id, connection_id, track),
            SessionEvent::LinkStateChanged {
                peer_id,
                connection_id,
                state,
            } => self.handle_link_state(&peer_id, connection_id, state),
            SessionEvent::ScreenShareEnded { capture_id } => {
                info!("Display capture {} ended by the platform", capture_id);
                self.stop_screen_share(Some(capture_id)).await;
            }
            SessionEvent::Command { command, reply } => {
                let result = self.handle_command(command).await;
                if let Err(e) = &result {
                    warn!("Command failed: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionEvent::Query(query) => self.handle_query(query),
        }
    }

    /// Apply a user action
    pub async fn handle_command(&mut self, command: SessionCommand) -> Result<()> {
        debug!("Handling command {:?}", command);
        match command {
            SessionCommand::SelectStage(target) => self.select_stage(target),
            SessionCommand::StartScreenShare => self.start_screen_share().await,
            SessionCommand::StopScreenShare => {
                self.stop_screen_share(None).await;
                Ok(())
            }
            SessionCommand::SetAudioEnabled(enabled) => {
                self.media.set_audio_enabled(enabled);
                Ok(())
            }
            SessionCommand::SetVideoEnabled(enabled) => {
                self.media.set_video_enabled(enabled);
                Ok(())
            }
            SessionCommand::BroadcastRecording(status) => self.broadcast_recording(status),
            SessionCommand::Hangup => {
                self.hangup().await;
                Ok(())
            }
        }
    }

    fn handle_query(&self, query: SessionQuery) {
        match query {
            SessionQuery::RecordingSources(reply) => {
                let _ = reply.send(self.recording_sources());
            }
            SessionQuery::StageMeta(reply) => {
                let _ = reply.send(self.stage_meta());
            }
            SessionQuery::CallDuration(reply) => {
                let _ = reply.send(self.call_duration());
            }
        }
    }

    // ---- stage ----

    /// Put a participant on stage; unknown peers are rejected
    pub fn select_stage(&mut self, target: StageTarget) -> Result<()> {
        if let StageTarget::Peer(peer_id) = &target {
            if !self.registry.contains(peer_id) {
                return Err(Error::PeerNotFound(peer_id.clone()));
            }
        }

        self.stage.select(target);
        self.emit_stage();
        Ok(())
    }

    /// Overlay metadata of the staged participant
    pub fn stage_meta(&self) -> StageMeta {
        match self.stage.staged() {
            StageTarget::Local => StageMeta {
                name: self.identity.display_name.clone(),
                uid: self.identity.user_id.clone(),
                is_owner: self.identity.is_owner(&self.owner_uid),
            },
            StageTarget::Peer(peer_id) => {
                let entry = self.registry.get(peer_id);
                let name = entry
                    .map(|e| e.display_name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Remote".to_string());
                StageMeta {
                    name,
                    uid: entry.map(|e| e.remote_user_id.clone()).unwrap_or_default(),
                    is_owner: entry.map_or(false, |e| e.is_owner()),
                }
            }
        }
    }

    pub(crate) fn emit_stage(&self) {
        self.emit(CallEvent::StageChanged {
            target: self.stage.staged().clone(),
            meta: self.stage_meta(),
        });
    }

    // ---- media ----

    /// Substitute the display capture for the camera on every connection
    pub async fn start_screen_share(&mut self) -> Result<()> {
        let Some(started) = self.media.begin_screen_share().await? else {
            return Ok(());
        };

        self.substitute_video(&started.track).await;

        let tx = self.events_tx.clone();
        let capture_id = started.capture_id;
        let ended = started.ended;
        tokio::spawn(async move {
            if ended.await.is_ok() {
                let _ = tx.send(SessionEvent::ScreenShareEnded { capture_id });
            }
        });

        self.emit(CallEvent::ScreenShareChanged { active: true });
        self.stage.show_local();
        self.emit_stage();
        Ok(())
    }

    /// Restore the camera track on every connection
    ///
    /// With a capture id, only that capture is stopped (stale platform
    /// notifications are ignored).
    pub async fn stop_screen_share(&mut self, capture_id: Option<u64>) {
        let Some(camera) = self.media.end_screen_share(capture_id) else {
            return;
        };

        if let Some(camera) = camera {
            self.substitute_video(&camera).await;
        }

        self.emit(CallEvent::ScreenShareChanged { active: false });
        self.stage.show_local();
        self.emit_stage();
    }

    async fn substitute_video(&self, track: &Arc<LocalTrack>) {
        for connection in self.registry.connections() {
            if let Err(e) = connection.replace_video_track(track).await {
                warn!(
                    "Failed to replace video track for peer {}: {}",
                    connection.peer_id(),
                    e
                );
            }
        }
    }

    /// Local preview stream (camera, or screen while sharing)
    pub fn local_preview(&self) -> Option<LocalStream> {
        self.media.outgoing_stream()
    }

    /// Whether a screen share is active
    pub fn is_screen_sharing(&self) -> bool {
        self.media.is_screen_sharing()
    }

    /// Current recording inputs: stage video and every audio source
    pub fn recording_sources(&self) -> RecordingSources {
        let stage = match self.stage.staged() {
            StageTarget::Local => StageSource::Local(self.media.outgoing_stream()),
            StageTarget::Peer(peer_id) => StageSource::Remote {
                peer_id: peer_id.clone(),
                media: self
                    .registry
                    .get(peer_id)
                    .and_then(|e| e.remote_media.clone()),
            },
        };

        let mut audio = Vec::new();
        if let Some(mic) = self.media.local_stream().and_then(|s| s.audio.clone()) {
            audio.push(AudioSource::Local(mic));
        }
        for entry in self.registry.iter() {
            if let Some(track) = entry.remote_media.as_ref().and_then(|m| m.audio.clone()) {
                audio.push(AudioSource::Remote {
                    peer_id: entry.peer_id.clone(),
                    track,
                });
            }
        }

        RecordingSources { stage, audio }
    }

    // ---- recording status ----

    /// Broadcast a recording status to the room; owner only
    pub fn broadcast_recording(&mut self, status: RecordingStatus) -> Result<()> {
        if !self.identity.is_owner(&self.owner_uid) {
            return Err(Error::NotOwner(format!(
                "uid {:?} is not the room owner",
                self.identity.user_id
            )));
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        self.signaling
            .send(&OutboundMessage::recording(status, timestamp));
        self.set_recording(status, serde_json::json!(timestamp));
        Ok(())
    }

    pub(crate) fn set_recording(&mut self, status: RecordingStatus, timestamp: serde_json::Value) {
        self.recording = Some(status);
        self.emit(CallEvent::RecordingIndicator { status, timestamp });
    }

    /// Last recording status seen in the room
    pub fn recording_status(&self) -> Option<RecordingStatus> {
        self.recording
    }

    // ---- call timer ----

    fn start_call_timer(&mut self) {
        self.call_started_at = Some(Instant::now());
        self.emit(CallEvent::CallTimerStarted);
    }

    pub(crate) fn stop_call_timer(&mut self) {
        if let Some(started) = self.call_started_at.take() {
            self.emit(CallEvent::CallTimerStopped {
                duration: started.elapsed(),
            });
        }
    }

    pub(crate) fn maybe_stop_timer_if_alone(&mut self) {
        if self.registry.is_empty() {
            self.stop_call_timer();
        }
    }

    pub(crate) fn maybe_restart_timer(&mut self) {
        if self.call_started_at.is_none() {
            self.start_call_timer();
        }
    }

    /// Time since the call timer started, if running
    pub fn call_duration(&self) -> Option<Duration> {
        self.call_started_at.map(|t| t.elapsed())
    }

    // ---- teardown ----

    /// Leave the call: stop sharing, say bye, close everything
    pub async fn hangup(&mut self) {
        info!("Hanging up");
        self.stop_screen_share(None).await;
        self.signaling.close().await;
        self.teardown_all().await;
        self.media.release_all();
        self.media.set_audio_enabled(true);
        self.media.set_video_enabled(true);
        if self.stage.show_local() {
            self.emit_stage();
        }
        self.stop_call_timer();
        self.phase = SessionPhase::Left;
        self.emit(CallEvent::Left);
    }

    async fn handle_channel_closed(&mut self) {
        warn!("Signaling channel closed, tearing down the call");
        self.teardown_all().await;
        self.stop_screen_share(None).await;
        if self.stage.show_local() {
            self.emit_stage();
        }
        self.stop_call_timer();
        self.phase = SessionPhase::Disconnected;
        self.emit(CallEvent::Disconnected);
    }

    async fn teardown_all(&mut self) {
        for entry in self.registry.drain() {
            if let Some(connection) = entry.connection {
                if let Err(e) = connection.close().await {
                    warn!("Failed to close connection to {}: {}", entry.peer_id, e);
                }
            }
            self.emit(CallEvent::PeerRemoved {
                peer_id: entry.peer_id,
            });
        }
    }

    // ---- accessors ----

    /// Local identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Announced owner uid (empty when unknown)
    pub fn owner_uid(&self) -> &str {
        &self.owner_uid
    }

    /// Peer registry
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Stage state
    pub fn stage(&self) -> &StageSelector {
        &self.stage
    }

    /// Lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn emit(&self, event: CallEvent) {
        if self.call_events.send(event).is_err() {
            debug!("No listener for call events");
        }
    }
}
