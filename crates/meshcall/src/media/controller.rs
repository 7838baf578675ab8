//! Local capture and screen-share bookkeeping

use super::tracks::{LocalStream, LocalTrack, TrackSource};
use crate::config::VideoCodec;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// A display capture plus its platform "ended" signal
///
/// The capture counts as ended only when the sender fires; dropping the
/// sender without firing means nothing.
pub struct DisplayCapture {
    /// Display stream (one video track)
    pub stream: LocalStream,

    /// Fires when the platform stops the capture on its own
    pub ended: oneshot::Receiver<()>,
}

/// Source of local capture streams
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open microphone + camera
    async fn open_camera(&self) -> Result<LocalStream>;

    /// Open a display capture
    async fn open_display(&self) -> Result<DisplayCapture>;

    /// Stop every track of a stream
    fn release(&self, stream: &LocalStream);
}

/// Screen share that just began
pub struct ScreenShareStarted {
    /// Id used to match the platform-ended notification
    pub capture_id: u64,

    /// Display track to substitute on every connection
    pub track: Arc<LocalTrack>,

    /// Platform-ended signal of the capture
    pub ended: oneshot::Receiver<()>,
}

struct ActiveShare {
    capture_id: u64,
    stream: LocalStream,
    camera_track: Option<Arc<LocalTrack>>,
}

/// Owns the local capture stream and the optional display capture
pub struct MediaController {
    device: Arc<dyn CaptureDevice>,
    local: Option<LocalStream>,
    share: Option<ActiveShare>,
    next_capture_id: u64,
    audio_enabled: bool,
    video_enabled: bool,
}

impl MediaController {
    /// Create a controller over a capture device
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            local: None,
            share: None,
            next_capture_id: 1,
            audio_enabled: true,
            video_enabled: true,
        }
    }

    /// Open the camera stream once; later calls return the same stream
    pub async fn acquire_local_media(&mut self) -> Result<LocalStream> {
        if let Some(stream) = &self.local {
            return Ok(stream.clone());
        }

        let stream = self.device.open_camera().await?;
        if let Some(audio) = &stream.audio {
            audio.set_enabled(self.audio_enabled);
        }
        if let Some(video) = &stream.video {
            video.set_enabled(self.video_enabled);
        }

        info!("Local media acquired: stream={}", stream.id);
        self.local = Some(stream.clone());
        Ok(stream)
    }

    /// Camera stream, if acquired
    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local.as_ref()
    }

    /// Whether a display capture is active
    pub fn is_screen_sharing(&self) -> bool {
        self.share.is_some()
    }

    /// Video track currently sent to peers: display while sharing, else camera
    pub fn outgoing_video(&self) -> Option<Arc<LocalTrack>> {
        match &self.share {
            Some(share) => share.stream.video.clone(),
            None => self.local.as_ref().and_then(|s| s.video.clone()),
        }
    }

    /// Stream attached to new connections and shown as local preview
    pub fn outgoing_stream(&self) -> Option<LocalStream> {
        let local = self.local.as_ref()?;
        Some(LocalStream {
            id: local.id.clone(),
            audio: local.audio.clone(),
            video: self.outgoing_video(),
        })
    }

    /// Start a display capture
    ///
    /// Returns `None` when already sharing. On error nothing changes.
    pub async fn begin_screen_share(&mut self) -> Result<Option<ScreenShareStarted>> {
        if self.share.is_some() {
            debug!("Screen share already active");
            return Ok(None);
        }

        self.acquire_local_media().await?;

        let capture = self.device.open_display().await?;
        let track = match capture.stream.video.clone() {
            Some(track) => track,
            None => {
                self.device.release(&capture.stream);
                return Err(Error::MediaAcquisition(
                    "display capture has no video track".to_string(),
                ));
            }
        };
        track.set_enabled(self.video_enabled);

        let capture_id = self.next_capture_id;
        self.next_capture_id += 1;

        self.share = Some(ActiveShare {
            capture_id,
            stream: capture.stream,
            camera_track: self.local.as_ref().and_then(|s| s.video.clone()),
        });

        info!("Screen share started: capture_id={}", capture_id);
        Ok(Some(ScreenShareStarted {
            capture_id,
            track,
            ended: capture.ended,
        }))
    }

    /// Stop the display capture and hand back the camera track to restore
    ///
    /// With `Some(capture_id)` only that capture is stopped; a stale id is a
    /// no-op. Returns `None` when nothing was stopped.
    pub fn end_screen_share(&mut self, capture_id: Option<u64>) -> Option<Option<Arc<LocalTrack>>> {
        match (&self.share, capture_id) {
            (None, _) => return None,
            (Some(share), Some(id)) if share.capture_id != id => {
                debug!("Ignoring end of stale capture {}", id);
                return None;
            }
            _ => {}
        }

        let share = self.share.take()?;
        self.device.release(&share.stream);
        info!("Screen share stopped: capture_id={}", share.capture_id);
        Some(share.camera_track)
    }

    /// Enable or mute the microphone
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
        if let Some(audio) = self.local.as_ref().and_then(|s| s.audio.as_ref()) {
            audio.set_enabled(enabled);
        }
    }

    /// Enable or blank the outgoing video (camera and display)
    pub fn set_video_enabled(&mut self, enabled: bool) {
        self.video_enabled = enabled;
        if let Some(video) = self.local.as_ref().and_then(|s| s.video.as_ref()) {
            video.set_enabled(enabled);
        }
        if let Some(video) = self.share.as_ref().and_then(|s| s.stream.video.as_ref()) {
            video.set_enabled(enabled);
        }
    }

    /// Microphone flag
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Video flag
    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    /// Release every capture
    pub fn release_all(&mut self) {
        self.end_screen_share(None);
        if let Some(stream) = self.local.take() {
            self.device.release(&stream);
            info!("Local media released: stream={}", stream.id);
        }
    }
}

/// Capture device producing webrtc sample tracks with no real source
///
/// Lets a headless client join a room and negotiate real connections.
/// No samples are written; a frame producer would push them through
/// [`LocalTrack::write_sample`].
/// [`SyntheticCapture::stop_display`] simulates the platform stopping a
/// display capture.
pub struct SyntheticCapture {
    codec: VideoCodec,
    display_ended: Mutex<Option<oneshot::Sender<()>>>,
}

impl SyntheticCapture {
    /// Create a device producing tracks with `codec`
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            display_ended: Mutex::new(None),
        }
    }

    /// Fire the ended signal of the last display capture
    pub fn stop_display(&self) -> bool {
        match self.display_ended.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn open_camera(&self) -> Result<LocalStream> {
        let mut stream = LocalStream::new(format!("local-{}", uuid::Uuid::new_v4()));
        stream.audio = Some(LocalTrack::microphone(&stream.id));
        stream.video = Some(LocalTrack::video(TrackSource::Camera, self.codec, &stream.id));
        Ok(stream)
    }

    async fn open_display(&self) -> Result<DisplayCapture> {
        let mut stream = LocalStream::new(format!("screen-{}", uuid::Uuid::new_v4()));
        stream.video = Some(LocalTrack::video(TrackSource::Screen, self.codec, &stream.id));

        let (tx, rx) = oneshot::channel();
        *self.display_ended.lock() = Some(tx);

        Ok(DisplayCapture { stream, ended: rx })
    }

    fn release(&self, stream: &LocalStream) {
        for track in stream.tracks() {
            track.set_enabled(false);
        }
        debug!("Released synthetic stream {}", stream.id);
    }
}
