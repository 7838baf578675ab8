//! Joining a room and talking to a running session

use super::{
    CallEvent, CallSession, RecordingSources, SessionCommand, SessionEvent, SessionQuery,
    StageMeta, StageTarget,
};
use crate::config::CallConfig;
use crate::identity::Identity;
use crate::media::{CaptureDevice, MediaController};
use crate::peer::ConnectionFactory;
use crate::signaling::{RecordingStatus, SignalingChannel};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Wrap the sender side of a session's event queue
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    async fn command(&self, command: SessionCommand) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Command {
                command,
                reply: Some(reply),
            })
            .map_err(|_| Error::SessionError("session has ended".to_string()))?;

        rx.await
            .map_err(|_| Error::SessionError("session ended before replying".to_string()))?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionQuery) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Query(make(reply)))
            .map_err(|_| Error::SessionError("session has ended".to_string()))?;

        rx.await
            .map_err(|_| Error::SessionError("session ended before replying".to_string()))
    }

    /// Put a participant on stage
    pub async fn select_stage(&self, target: StageTarget) -> Result<()> {
        self.command(SessionCommand::SelectStage(target)).await
    }

    /// Start sharing the screen
    pub async fn start_screen_share(&self) -> Result<()> {
        self.command(SessionCommand::StartScreenShare).await
    }

    /// Stop sharing the screen
    pub async fn stop_screen_share(&self) -> Result<()> {
        self.command(SessionCommand::StopScreenShare).await
    }

    /// Mute or unmute the microphone
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        self.command(SessionCommand::SetAudioEnabled(enabled)).await
    }

    /// Enable or blank outgoing video
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        self.command(SessionCommand::SetVideoEnabled(enabled)).await
    }

    /// Broadcast a recording status (owner only)
    pub async fn broadcast_recording(&self, status: RecordingStatus) -> Result<()> {
        self.command(SessionCommand::BroadcastRecording(status)).await
    }

    /// Leave the call
    pub async fn hangup(&self) -> Result<()> {
        self.command(SessionCommand::Hangup).await
    }

    /// Current recording inputs
    pub async fn recording_sources(&self) -> Result<RecordingSources> {
        self.query(SessionQuery::RecordingSources).await
    }

    /// Overlay metadata of the staged participant
    pub async fn stage_meta(&self) -> Result<StageMeta> {
        self.query(SessionQuery::StageMeta).await
    }

    /// Elapsed call time, if the timer runs
    pub async fn call_duration(&self) -> Result<Option<Duration>> {
        self.query(SessionQuery::CallDuration).await
    }
}

/// A joined call
pub struct JoinedCall {
    /// Handle for commands and queries
    pub handle: SessionHandle,
    /// Rendering notifications
    pub events: mpsc::UnboundedReceiver<CallEvent>,
    /// The session loop; completes after hangup or disconnect
    pub task: JoinHandle<()>,
}

/// Acquire local media, connect to the room and start the session loop
///
/// Media acquisition failures abort the join before any network activity.
pub async fn join(
    config: &CallConfig,
    room_id: &str,
    identity: Identity,
    factory: Arc<dyn ConnectionFactory>,
    device: Arc<dyn CaptureDevice>,
) -> Result<JoinedCall> {
    config.validate()?;
    if room_id.is_empty() {
        return Err(Error::InvalidConfig("room id is empty".to_string()));
    }
    let url = config.room_url(room_id)?;

    let mut media = MediaController::new(device);
    media.acquire_local_media().await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let channel = match SignalingChannel::connect(url, events_tx.clone()).await {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            media.release_all();
            return Err(e);
        }
    };

    let (mut session, events) =
        CallSession::new(identity, channel, factory, media, events_tx.clone());
    session.start();

    info!("Session started for room {}", room_id);
    let task = tokio::spawn(session.run(events_rx));

    Ok(JoinedCall {
        handle: SessionHandle::new(events_tx),
        events,
        task,
    })
}
