//! Room-scoped WebSocket signaling
//!
//! - [`protocol`]: JSON envelope types, parsed once at the boundary
//! - [`channel`]: the WebSocket transport and the [`SignalingSink`] seam

pub mod channel;
pub mod protocol;

pub use channel::{SignalingChannel, SignalingSink};
pub use protocol::{
    IceCandidate, InboundMessage, OutboundMessage, PeerSummary, RecordingNotice, RecordingStatus,
    SdpType, SessionDescription,
};
