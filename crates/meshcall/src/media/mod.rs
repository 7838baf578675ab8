//! Local capture, screen share and remote media handles

pub mod controller;
pub mod tracks;

pub use controller::{
    CaptureDevice, DisplayCapture, MediaController, ScreenShareStarted, SyntheticCapture,
};
pub use tracks::{LocalStream, LocalTrack, RemoteMedia, RemoteTrack, TrackKind, TrackSource};
