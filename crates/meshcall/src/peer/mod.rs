//! Remote peers and their media connections

pub mod connection;
pub mod registry;

pub use connection::{
    ConnectionEvents, ConnectionFactory, LinkState, MediaConnection, NegotiationState,
    RtcPeerConnection, WebRtcConnectionFactory,
};
pub use registry::{LinkPhase, NegotiationRole, PeerEntry, PeerMetadata, PeerRegistry};
