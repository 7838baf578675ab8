//! In-process fakes for driving a `CallSession` without a network
//!
//! - [`RecordingSink`]: captures every outbound signaling message
//! - [`FakeFactory`] / [`FakeConnection`]: count creates, closes and track swaps,
//!   and fail individual operations on demand
//! - [`FakeCapture`]: synthetic capture that can be told to fail

#![allow(dead_code)]

use async_trait::async_trait;
use meshcall::media::{
    CaptureDevice, DisplayCapture, LocalStream, LocalTrack, MediaController, SyntheticCapture,
};
use meshcall::peer::{ConnectionEvents, ConnectionFactory, MediaConnection, NegotiationState};
use meshcall::session::{CallEvent, CallSession, SessionEvent};
use meshcall::signaling::{
    IceCandidate, InboundMessage, OutboundMessage, SessionDescription, SignalingSink,
};
use meshcall::{Error, Identity, Result, VideoCodec};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,meshcall=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Signaling
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<OutboundMessage>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn offers_to(&self, peer_id: &str) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Offer { to, .. } if to == peer_id))
            .count()
    }

    pub fn answers_to(&self, peer_id: &str) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Answer { to, .. } if to == peer_id))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingSink for RecordingSink {
    fn send(&self, msg: &OutboundMessage) {
        if self.is_closed() {
            return;
        }
        self.sent.lock().push(msg.clone());
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.sent.lock().push(OutboundMessage::Bye);
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

pub struct FakeConnection {
    peer_id: String,
    connection_id: Uuid,
    pub events: ConnectionEvents,
    state: Mutex<NegotiationState>,
    closes: AtomicUsize,
    answers_applied: AtomicUsize,
    attached: Mutex<Option<LocalStream>>,
    video: Mutex<Option<Arc<LocalTrack>>>,
    replacements: AtomicUsize,
    candidates: Mutex<Vec<IceCandidate>>,
    /// `create_offer` and `accept_offer` fail
    pub fail_negotiation: AtomicBool,
    /// `replace_video_track` fails
    pub fail_replace: AtomicBool,
    /// `add_ice_candidate` fails
    pub fail_ice: AtomicBool,
}

impl FakeConnection {
    fn new(events: ConnectionEvents) -> Self {
        Self {
            peer_id: events.peer_id().to_string(),
            connection_id: events.connection_id(),
            events,
            state: Mutex::new(NegotiationState::Stable),
            closes: AtomicUsize::new(0),
            answers_applied: AtomicUsize::new(0),
            attached: Mutex::new(None),
            video: Mutex::new(None),
            replacements: AtomicUsize::new(0),
            candidates: Mutex::new(Vec::new()),
            fail_negotiation: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            fail_ice: AtomicBool::new(false),
        }
    }

    fn failing(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::WebRtcError(format!("{} failed", what)));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.connection_id
    }

    pub fn set_state(&self, state: NegotiationState) {
        *self.state.lock() = state;
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn answers_applied(&self) -> usize {
        self.answers_applied.load(Ordering::SeqCst)
    }

    /// Outgoing video track currently on the sender
    pub fn video(&self) -> Option<Arc<LocalTrack>> {
        self.video.lock().clone()
    }

    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }

    pub fn attached(&self) -> Option<LocalStream> {
        self.attached.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    async fn attach_local_tracks(&self, stream: &LocalStream) -> Result<()> {
        *self.video.lock() = stream.video.clone();
        *self.attached.lock() = Some(stream.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Self::failing(&self.fail_negotiation, "create_offer")?;
        *self.state.lock() = NegotiationState::HaveLocalOffer;
        Ok(SessionDescription::offer(format!("v=0 offer to {}", self.peer_id)))
    }

    async fn accept_offer(&self, _offer: SessionDescription) -> Result<SessionDescription> {
        Self::failing(&self.fail_negotiation, "accept_offer")?;
        *self.state.lock() = NegotiationState::Stable;
        Ok(SessionDescription::answer(format!("v=0 answer to {}", self.peer_id)))
    }

    async fn apply_answer(&self, _answer: SessionDescription) -> Result<()> {
        let mut state = self.state.lock();
        if *state != NegotiationState::HaveLocalOffer {
            return Err(Error::SdpError("no pending offer".to_string()));
        }
        *state = NegotiationState::Stable;
        self.answers_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        Self::failing(&self.fail_ice, "add_ice_candidate")?;
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn replace_video_track(&self, track: &Arc<LocalTrack>) -> Result<()> {
        Self::failing(&self.fail_replace, "replace_video_track")?;
        *self.video.lock() = Some(Arc::clone(track));
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signaling_state(&self) -> NegotiationState {
        *self.state.lock()
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = NegotiationState::Closed;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeConnection>>>,
    failing_negotiation: Mutex<Vec<String>>,
}

impl FakeFactory {
    /// Connections created for `peer_id` from now on fail offer/answer work
    pub fn fail_negotiation_for(&self, peer_id: &str) {
        self.failing_negotiation.lock().push(peer_id.to_string());
    }

    pub fn created(&self) -> Vec<Arc<FakeConnection>> {
        self.created.lock().clone()
    }

    pub fn created_for(&self, peer_id: &str) -> Vec<Arc<FakeConnection>> {
        self.created()
            .into_iter()
            .filter(|c| c.peer_id == peer_id)
            .collect()
    }

    /// Latest connection created for a peer
    pub fn last_for(&self, peer_id: &str) -> Arc<FakeConnection> {
        self.created_for(peer_id)
            .pop()
            .unwrap_or_else(|| panic!("no connection created for {}", peer_id))
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>> {
        let connection = Arc::new(FakeConnection::new(events));
        if self
            .failing_negotiation
            .lock()
            .iter()
            .any(|id| *id == connection.peer_id)
        {
            connection.fail_negotiation.store(true, Ordering::SeqCst);
        }
        self.created.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

// ============================================================================
// Capture
// ============================================================================

pub struct FakeCapture {
    pub inner: SyntheticCapture,
    pub fail_camera: AtomicBool,
    pub fail_display: AtomicBool,
    releases: AtomicUsize,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            inner: SyntheticCapture::new(VideoCodec::VP8),
            fail_camera: AtomicBool::new(false),
            fail_display: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn open_camera(&self) -> Result<LocalStream> {
        if self.fail_camera.load(Ordering::SeqCst) {
            return Err(Error::MediaAcquisition("camera permission denied".to_string()));
        }
        self.inner.open_camera().await
    }

    async fn open_display(&self) -> Result<DisplayCapture> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(Error::MediaAcquisition("display capture cancelled".to_string()));
        }
        self.inner.open_display().await
    }

    fn release(&self, stream: &LocalStream) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release(stream);
    }
}

// ============================================================================
// Session driver
// ============================================================================

pub struct TestSession {
    pub session: CallSession,
    pub queue: mpsc::UnboundedReceiver<SessionEvent>,
    pub calls: mpsc::UnboundedReceiver<CallEvent>,
    pub sink: Arc<RecordingSink>,
    pub factory: Arc<FakeFactory>,
    pub device: Arc<FakeCapture>,
}

impl TestSession {
    /// A started session with acquired local media
    pub async fn new(identity: Identity) -> Self {
        init_logging();

        let sink = Arc::new(RecordingSink::default());
        let factory = Arc::new(FakeFactory::default());
        let device = Arc::new(FakeCapture::new());

        let mut media = MediaController::new(device.clone());
        media.acquire_local_media().await.unwrap();

        let (events_tx, queue) = mpsc::unbounded_channel();
        let (mut session, calls) =
            CallSession::new(identity, sink.clone(), factory.clone(), media, events_tx);
        session.start();

        Self {
            session,
            queue,
            calls,
            sink,
            factory,
            device,
        }
    }

    pub async fn guest(name: &str) -> Self {
        Self::new(Identity::new(name, "")).await
    }

    /// Feed one raw signaling frame
    pub async fn signal(&mut self, json: &str) {
        let msg = InboundMessage::parse(json);
        self.session.handle_event(SessionEvent::Signal(msg)).await;
    }

    pub async fn peers(&mut self, peers: &[(&str, &str, &str)], owner_uid: &str) {
        let list: Vec<serde_json::Value> = peers
            .iter()
            .map(|(id, name, uid)| serde_json::json!({"id": id, "name": name, "avatar": "", "uid": uid}))
            .collect();
        let json = serde_json::json!({"type": "peers", "peers": list, "owner_uid": owner_uid});
        self.signal(&json.to_string()).await;
    }

    pub async fn peer_joined(&mut self, id: &str, name: &str, uid: &str) {
        let json = serde_json::json!({"type": "peer-joined", "id": id, "name": name, "avatar": "", "uid": uid});
        self.signal(&json.to_string()).await;
    }

    pub async fn offer_from(&mut self, id: &str) {
        let json = serde_json::json!({"type": "offer", "from": id, "data": {"type": "offer", "sdp": "v=0 remote"}});
        self.signal(&json.to_string()).await;
    }

    pub async fn answer_from(&mut self, id: &str) {
        let json = serde_json::json!({"type": "answer", "from": id, "data": {"type": "answer", "sdp": "v=0 remote"}});
        self.signal(&json.to_string()).await;
    }

    pub async fn peer_left(&mut self, id: &str) {
        let json = serde_json::json!({"type": "peer-left", "id": id});
        self.signal(&json.to_string()).await;
    }

    /// Apply the next queued session event (connection callback, watcher)
    pub async fn pump_one(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(2), self.queue.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session queue closed");
        self.session.handle_event(event).await;
    }

    /// Apply every session event queued so far
    pub async fn pump(&mut self) {
        while let Ok(event) = self.queue.try_recv() {
            self.session.handle_event(event).await;
        }
    }

    /// Drain the rendering notifications emitted so far
    pub fn call_events(&mut self) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.calls.try_recv() {
            events.push(event);
        }
        events
    }

    /// Video track currently sent to peers (camera, or screen while sharing)
    pub fn outgoing_video(&self) -> Arc<LocalTrack> {
        self.session
            .local_preview()
            .and_then(|s| s.video)
            .expect("outgoing video track")
    }
}
