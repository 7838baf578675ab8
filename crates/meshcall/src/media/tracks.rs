//! Local and remote media track handles

use crate::config::VideoCodec;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// Where a local track comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    /// Microphone capture
    Microphone,
    /// Camera capture
    Camera,
    /// Display capture (screen share)
    Screen,
}

/// A locally produced track
///
/// Identity is by reference: two `Arc<LocalTrack>` are the same track only
/// if [`LocalTrack::same`] holds. The webrtc sample track inside is what
/// gets attached to peer connection senders.
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl LocalTrack {
    /// Create a track with an explicit codec capability
    pub fn new(
        kind: TrackKind,
        source: TrackSource,
        codec: RTCRtpCodecCapability,
        stream_id: &str,
    ) -> Self {
        let id = format!("{}-{}", source.label(), uuid::Uuid::new_v4());
        let rtc = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_string(),
        ));

        Self {
            id,
            kind,
            source,
            enabled: AtomicBool::new(true),
            rtc,
        }
    }

    /// Opus microphone track
    pub fn microphone(stream_id: &str) -> Arc<Self> {
        Arc::new(Self::new(
            TrackKind::Audio,
            TrackSource::Microphone,
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            stream_id,
        ))
    }

    /// Video track from a camera or display source
    pub fn video(source: TrackSource, codec: VideoCodec, stream_id: &str) -> Arc<Self> {
        Arc::new(Self::new(
            TrackKind::Video,
            source,
            RTCRtpCodecCapability {
                mime_type: codec.mime_type().to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            stream_id,
        ))
    }

    /// Track id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Capture source
    pub fn source(&self) -> TrackSource {
        self.source
    }

    /// Whether samples are currently forwarded
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or mute the track without detaching it
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Same track by reference
    pub fn same(a: &Arc<LocalTrack>, b: &Arc<LocalTrack>) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Track handle for attaching to an RTP sender
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.rtc) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Write one encoded sample; dropped while the track is disabled
    ///
    /// Called by whatever produces frames for the track (an encoder fed by a
    /// real capture device). [`SyntheticCapture`](crate::media::SyntheticCapture)
    /// produces none, so its tracks stay silent.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };

        self.rtc
            .write_sample(&sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))
    }
}

impl TrackSource {
    fn label(&self) -> &'static str {
        match self {
            TrackSource::Microphone => "mic",
            TrackSource::Camera => "camera",
            TrackSource::Screen => "screen",
        }
    }
}

/// Local capture stream: at most one audio and one video track
#[derive(Debug, Clone)]
pub struct LocalStream {
    /// Stream id
    pub id: String,

    /// Microphone track
    pub audio: Option<Arc<LocalTrack>>,

    /// Camera or screen track
    pub video: Option<Arc<LocalTrack>>,
}

impl LocalStream {
    /// Create an empty stream
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio: None,
            video: None,
        }
    }

    /// All tracks of the stream
    pub fn tracks(&self) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.audio.iter().chain(self.video.iter())
    }

    /// Whether the video slot holds exactly this track
    pub fn has_video(&self, track: &Arc<LocalTrack>) -> bool {
        self.video
            .as_ref()
            .map_or(false, |v| LocalTrack::same(v, track))
    }
}

/// A track received from a remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Track id announced by the remote side
    pub id: String,

    /// Stream id the track belongs to
    pub stream_id: String,

    /// Media kind
    pub kind: TrackKind,
}

/// Most recently received remote stream of a peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMedia {
    /// Stream id
    pub stream_id: String,

    /// Audio track, if any
    pub audio: Option<RemoteTrack>,

    /// Video track, if any
    pub video: Option<RemoteTrack>,
}

impl RemoteMedia {
    /// Apply a track arrival
    ///
    /// A track of a different stream replaces the whole media; a track of the
    /// same stream overwrites the slot of its kind.
    pub fn apply(current: Option<RemoteMedia>, track: RemoteTrack) -> RemoteMedia {
        let mut media = match current {
            Some(m) if m.stream_id == track.stream_id => m,
            _ => RemoteMedia {
                stream_id: track.stream_id.clone(),
                ..Default::default()
            },
        };

        match track.kind {
            TrackKind::Audio => media.audio = Some(track),
            TrackKind::Video => media.video = Some(track),
        }
        media
    }
}
