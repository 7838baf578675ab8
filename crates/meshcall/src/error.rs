//! Error types for the call client

/// Result type alias using the call client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a call session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling channel error (transport not open, send failure)
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Peer not present in the registry
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error (attach, replace)
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Camera, microphone or display capture denied or unavailable
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// Action reserved to the room owner
    #[error("Not the room owner: {0}")]
    NotOwner(String),

    /// Session is not joined or already left
    #[error("Session error: {0}")]
    SessionError(String),

    /// Auxiliary HTTP service error
    #[error("API error: {0}")]
    ApiError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ApiError(e.to_string())
    }
}

impl Error {
    /// Check if this error is retryable
    ///
    /// Nothing in the session retries on its own; this is a hint for callers
    /// deciding whether re-joining makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SignalingError(_) | Error::WebSocketError(_) | Error::IoError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is scoped to a single peer's negotiation
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::PeerConnectionError(_)
                | Error::IceCandidateError(_)
                | Error::SdpError(_)
        )
    }

    /// Check if this error comes from local capture
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::MediaAcquisition(_) | Error::MediaTrackError(_))
    }
}
