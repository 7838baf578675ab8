//! Room signaling protocol types
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! are parsed exactly once at the channel boundary into [`InboundMessage`];
//! frames with an unrecognised `type` become [`InboundMessage::Unknown`] and
//! frames that are not JSON objects, or do not match the shape of their
//! `type`, become [`InboundMessage::Malformed`].

use serde::{Deserialize, Deserializer, Serialize};

/// SDP description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer from the negotiating side
    Offer,
    /// Answer to a received offer
    Answer,
}

/// Session description as exchanged in `offer`/`answer` payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// `offer` or `answer`
    #[serde(rename = "type")]
    pub kind: SdpType,

    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,

    /// Media line index
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// Room member as listed in `peers`, `peer-joined` and `peer-info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PeerSummary {
    /// Server-assigned peer id
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,

    /// Display name
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    /// Avatar URL
    #[serde(default, deserialize_with = "null_as_empty")]
    pub avatar: String,

    /// Stable user id
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uid: String,
}

/// Recording state broadcast by the room owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Recording started
    Start,
    /// Recording paused
    Pause,
    /// Recording resumed
    Resume,
    /// Recording stopped
    Stop,
}

/// Messages received from the signaling server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Room snapshot sent right after joining
    Peers {
        /// Members already present; unusable entries are dropped
        #[serde(default, deserialize_with = "lenient_peers")]
        peers: Vec<PeerSummary>,
        /// Current owner uid (empty when unknown)
        #[serde(default, deserialize_with = "null_as_empty")]
        owner_uid: String,
    },

    /// A new member joined
    PeerJoined(PeerSummary),

    /// Metadata update for a member
    PeerInfo(PeerSummary),

    /// Authoritative owner announcement
    OwnerSet {
        /// Owner uid
        #[serde(default, deserialize_with = "null_as_empty")]
        owner_uid: String,
    },

    /// Relayed SDP offer
    Offer {
        /// Sending peer id
        from: String,
        /// Offer description
        data: SessionDescription,
    },

    /// Relayed SDP answer
    Answer {
        /// Sending peer id
        from: String,
        /// Answer description
        data: SessionDescription,
    },

    /// Relayed ICE candidate
    Ice {
        /// Sending peer id
        from: String,
        /// Candidate
        data: IceCandidate,
    },

    /// A member's socket closed
    PeerLeft {
        /// Departed peer id
        id: String,
    },

    /// A member hung up
    Bye {
        /// Departed peer id
        id: String,
    },

    /// Server-side rejection
    Error {
        /// Human-readable reason
        #[serde(default, deserialize_with = "null_as_empty")]
        message: String,
    },

    /// Owner started recording
    RecordStart(RecordingNotice),

    /// Owner paused recording
    RecordPause(RecordingNotice),

    /// Owner resumed recording
    RecordResume(RecordingNotice),

    /// Owner stopped recording
    RecordStop(RecordingNotice),

    /// Well-formed frame with a `type` this client does not handle
    #[serde(skip)]
    Unknown {
        /// The unrecognised `type` value
        kind: String,
    },

    /// Frame that could not be decoded
    #[serde(skip)]
    Malformed {
        /// Decode failure description
        reason: String,
    },
}

/// Payload of an inbound `record-*` broadcast
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordingNotice {
    /// Owner uid that issued the broadcast
    #[serde(default, deserialize_with = "null_as_empty")]
    pub owner_uid: String,

    /// Timestamp as sent by the owner (milliseconds, or empty)
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

const KNOWN_TYPES: &[&str] = &[
    "peers",
    "peer-joined",
    "peer-info",
    "owner-set",
    "offer",
    "answer",
    "ice",
    "peer-left",
    "bye",
    "error",
    "record-start",
    "record-pause",
    "record-resume",
    "record-stop",
];

impl InboundMessage {
    /// Parse one text frame
    ///
    /// Never fails: undecodable frames are reported as
    /// [`InboundMessage::Malformed`] so the caller can log and move on.
    pub fn parse(text: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                return InboundMessage::Malformed {
                    reason: format!("invalid JSON: {}", e),
                }
            }
        };

        let kind = match value.get("type").and_then(|t| t.as_str()) {
            Some(kind) => kind.to_string(),
            None => {
                return InboundMessage::Malformed {
                    reason: "missing string field `type`".to_string(),
                }
            }
        };

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return InboundMessage::Unknown { kind };
        }

        match serde_json::from_value(value) {
            Ok(msg) => msg,
            Err(e) => InboundMessage::Malformed {
                reason: format!("bad `{}` frame: {}", kind, e),
            },
        }
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Peers { .. } => "peers",
            InboundMessage::PeerJoined(_) => "peer-joined",
            InboundMessage::PeerInfo(_) => "peer-info",
            InboundMessage::OwnerSet { .. } => "owner-set",
            InboundMessage::Offer { .. } => "offer",
            InboundMessage::Answer { .. } => "answer",
            InboundMessage::Ice { .. } => "ice",
            InboundMessage::PeerLeft { .. } => "peer-left",
            InboundMessage::Bye { .. } => "bye",
            InboundMessage::Error { .. } => "error",
            InboundMessage::RecordStart(_) => "record-start",
            InboundMessage::RecordPause(_) => "record-pause",
            InboundMessage::RecordResume(_) => "record-resume",
            InboundMessage::RecordStop(_) => "record-stop",
            InboundMessage::Unknown { kind } => kind,
            InboundMessage::Malformed { .. } => "malformed",
        }
    }
}

/// Messages sent to the signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Announce the local identity after the socket opens
    Hello {
        /// Display name
        name: String,
        /// User id, `null` when not yet resolved
        uid: Option<String>,
        /// Avatar URL
        avatar: String,
        /// Whether the client holds the owner link
        is_owner: bool,
        /// Free-form user info
        #[serde(default)]
        info: serde_json::Value,
    },

    /// SDP offer for one peer
    Offer {
        /// Target peer id
        to: String,
        /// Offer description
        data: SessionDescription,
    },

    /// SDP answer for one peer
    Answer {
        /// Target peer id
        to: String,
        /// Answer description
        data: SessionDescription,
    },

    /// Trickled ICE candidate for one peer
    Ice {
        /// Target peer id
        to: String,
        /// Candidate
        data: IceCandidate,
    },

    /// Voluntary departure
    Bye,

    /// Recording started (owner only)
    RecordStart {
        /// Milliseconds since the Unix epoch
        timestamp: u64,
    },

    /// Recording paused (owner only)
    RecordPause {
        /// Milliseconds since the Unix epoch
        timestamp: u64,
    },

    /// Recording resumed (owner only)
    RecordResume {
        /// Milliseconds since the Unix epoch
        timestamp: u64,
    },

    /// Recording stopped (owner only)
    RecordStop {
        /// Milliseconds since the Unix epoch
        timestamp: u64,
    },
}

impl OutboundMessage {
    /// Build the `record-*` broadcast for a status
    pub fn recording(status: RecordingStatus, timestamp: u64) -> Self {
        match status {
            RecordingStatus::Start => OutboundMessage::RecordStart { timestamp },
            RecordingStatus::Pause => OutboundMessage::RecordPause { timestamp },
            RecordingStatus::Resume => OutboundMessage::RecordResume { timestamp },
            RecordingStatus::Stop => OutboundMessage::RecordStop { timestamp },
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize message: {}", e))
        })
    }

    /// Parse from a JSON text frame
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize message: {}", e))
        })
    }

    /// Target peer id for per-peer messages
    pub fn target(&self) -> Option<&str> {
        match self {
            OutboundMessage::Offer { to, .. }
            | OutboundMessage::Answer { to, .. }
            | OutboundMessage::Ice { to, .. } => Some(to),
            _ => None,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A `peers` list that is null or not an array reads as empty, and entries
/// that are not member objects are skipped individually
fn lenient_peers<'de, D>(deserializer: D) -> Result<Vec<PeerSummary>, D::Error>
where
    D: Deserializer<'de>,
{
    let serde_json::Value::Array(entries) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PeerSummary>(entry).ok())
        .collect())
}
