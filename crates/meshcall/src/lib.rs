//! Mesh video call client
//!
//! Joins a room-scoped call over WebSocket signaling and keeps one WebRTC
//! peer connection per remote participant (full mesh).
//!
//! # Features
//!
//! - **Room signaling**: JSON envelopes over `{server_url}/ws/{room_id}`
//! - **Mesh lifecycle**: at most one connection per peer, glare-free roles
//! - **Stage selection**: user pin with automatic fallback to local
//! - **Screen share**: in-place video track substitution on every connection
//! - **Room owner**: owner badge, owner-only recording status broadcast
//! - **Auxiliary HTTP**: avatar cache and recording upload client
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  SignalingChannel (WebSocket)     SessionHandle (UI)  │
//! │        │ Signal / ChannelClosed        │ Command/Query│
//! │        ↓                               ↓              │
//! │  CallSession (single-writer event loop)               │
//! │  ├─ PeerRegistry (peer id → entry + connection)       │
//! │  ├─ StageSelector (pin / fallback)                    │
//! │  └─ MediaController (camera, mic, screen share)       │
//! │        ↑ LocalCandidate / RemoteTrack / LinkState     │
//! │  MediaConnection (RtcPeerConnection per peer)         │
//! │        ↓                                              │
//! │  CallEvent stream → renderer                          │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use meshcall::CallConfig;
//!
//! let config = CallConfig {
//!     server_url: "wss://call.example.com".to_string(),
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(
//!     config.room_url("abc").unwrap().as_str(),
//!     "wss://call.example.com/ws/abc"
//! );
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use meshcall::{session, CallConfig, Identity};
//! use meshcall::media::SyntheticCapture;
//! use meshcall::peer::WebRtcConnectionFactory;
//! use std::sync::Arc;
//!
//! # async fn example() -> meshcall::Result<()> {
//! let config = CallConfig::default();
//! let factory = Arc::new(WebRtcConnectionFactory::new(Arc::new(config.clone())));
//! let device = Arc::new(SyntheticCapture::new(config.video_codec));
//!
//! let mut call = session::join(&config, "abc", Identity::new("Ann", "42"), factory, device).await?;
//! while let Some(event) = call.events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{CallConfig, TurnServerConfig, VideoCodec};
pub use error::{Error, Result};
pub use identity::Identity;
pub use session::{join, CallEvent, CallSession, JoinedCall, SessionHandle, StageTarget};
