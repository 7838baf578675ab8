//! Messages flowing into and out of the session loop

use super::stage::{StageMeta, StageTarget};
use crate::media::{LocalStream, LocalTrack, RemoteMedia, RemoteTrack};
use crate::peer::{LinkState, PeerEntry};
use crate::signaling::{IceCandidate, InboundMessage, RecordingStatus};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Everything the session loop processes, strictly one at a time
#[derive(Debug)]
pub enum SessionEvent {
    /// Parsed inbound signaling message
    Signal(InboundMessage),

    /// The signaling transport closed
    ChannelClosed,

    /// A connection gathered a local ICE candidate
    LocalCandidate {
        /// Remote peer id
        peer_id: String,
        /// Connection that produced the candidate
        connection_id: Uuid,
        /// Candidate to trickle
        candidate: IceCandidate,
    },

    /// A connection received a remote track
    RemoteTrack {
        /// Remote peer id
        peer_id: String,
        /// Connection that received the track
        connection_id: Uuid,
        /// Track description
        track: RemoteTrack,
    },

    /// A connection's transport state changed
    LinkStateChanged {
        /// Remote peer id
        peer_id: String,
        /// Connection whose state changed
        connection_id: Uuid,
        /// New state
        state: LinkState,
    },

    /// The platform stopped a display capture
    ScreenShareEnded {
        /// Capture that ended
        capture_id: u64,
    },

    /// User action
    Command {
        /// Action to perform
        command: SessionCommand,
        /// Where to report the outcome
        reply: Option<oneshot::Sender<Result<()>>>,
    },

    /// Read-only query from a collaborator (recorder, UI)
    Query(SessionQuery),
}

/// User-initiated actions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Put a participant on stage
    SelectStage(StageTarget),
    /// Start sharing the screen
    StartScreenShare,
    /// Stop sharing the screen
    StopScreenShare,
    /// Mute or unmute the microphone
    SetAudioEnabled(bool),
    /// Enable or blank outgoing video
    SetVideoEnabled(bool),
    /// Broadcast a recording status to the room (owner only)
    BroadcastRecording(RecordingStatus),
    /// Leave the call
    Hangup,
}

/// Read-only queries answered from session state
#[derive(Debug)]
pub enum SessionQuery {
    /// Current recording inputs
    RecordingSources(oneshot::Sender<RecordingSources>),
    /// Overlay metadata of the staged participant
    StageMeta(oneshot::Sender<StageMeta>),
    /// Time since the call timer started, if running
    CallDuration(oneshot::Sender<Option<Duration>>),
}

/// Rendering-facing view of a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerView {
    /// Peer id
    pub peer_id: String,
    /// Display name
    pub display_name: String,
    /// Avatar URL
    pub avatar_url: String,
    /// Remote user id
    pub remote_user_id: String,
    /// Whether the peer owns the room
    pub is_owner: bool,
}

impl From<&PeerEntry> for PeerView {
    fn from(entry: &PeerEntry) -> Self {
        Self {
            peer_id: entry.peer_id.clone(),
            display_name: entry.display_name.clone(),
            avatar_url: entry.avatar_url.clone(),
            remote_user_id: entry.remote_user_id.clone(),
            is_owner: entry.is_owner(),
        }
    }
}

/// Notifications for the rendering layer
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// A peer tile should appear
    PeerAdded(PeerView),

    /// A peer's metadata changed
    PeerUpdated(PeerView),

    /// A peer tile should disappear
    PeerRemoved {
        /// Departed peer id
        peer_id: String,
    },

    /// A peer's remote media changed
    TrackUpdated {
        /// Peer id
        peer_id: String,
        /// Current remote media
        media: RemoteMedia,
    },

    /// The stage occupant (or its stream) changed
    StageChanged {
        /// Staged participant
        target: StageTarget,
        /// Overlay metadata
        meta: StageMeta,
    },

    /// The room owner changed
    OwnerChanged {
        /// New owner uid
        owner_uid: String,
    },

    /// The local user id was bound from the owner announcement
    LocalIdentityResolved {
        /// Adopted user id
        user_id: String,
        /// Chat id (defaults to the user id)
        chat_id: String,
    },

    /// The server rejected something; show verbatim
    ServerError(String),

    /// Recording status broadcast by the owner
    RecordingIndicator {
        /// New status
        status: RecordingStatus,
        /// Timestamp as sent
        timestamp: serde_json::Value,
    },

    /// Local screen share toggled
    ScreenShareChanged {
        /// Whether sharing is active
        active: bool,
    },

    /// The call timer started
    CallTimerStarted,

    /// The call timer stopped
    CallTimerStopped {
        /// Elapsed call time
        duration: Duration,
    },

    /// The signaling channel closed; all connections are gone
    Disconnected,

    /// The local user hung up
    Left,
}

/// Video source currently on stage
#[derive(Debug, Clone)]
pub enum StageSource {
    /// Local preview (camera or screen)
    Local(Option<LocalStream>),
    /// Remote peer media
    Remote {
        /// Peer id
        peer_id: String,
        /// Last received media, if any
        media: Option<RemoteMedia>,
    },
}

/// Audio input for the recording mix
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Local microphone
    Local(Arc<LocalTrack>),
    /// Remote peer audio
    Remote {
        /// Peer id
        peer_id: String,
        /// Remote audio track
        track: RemoteTrack,
    },
}

/// Inputs consumed by the recorder
#[derive(Debug, Clone)]
pub struct RecordingSources {
    /// Stage video
    pub stage: StageSource,
    /// Every audio source to mix
    pub audio: Vec<AudioSource>,
}
