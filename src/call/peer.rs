//! Seams between the call coordinator and the platform it runs on: local
//! capture devices, WebRTC peer connections and the realtime channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::Command;
use crate::user;

use super::{CallKind, IceCandidate, SessionDescription};

pub type Devices = Arc<dyn MediaDevices + Send + Sync>;
pub type Factory = Arc<dyn PeerFactory + Send + Sync>;
pub type Connection = Arc<dyn PeerConnection + Send + Sync>;
pub type Track = Arc<dyn LocalTrack + Send + Sync>;
pub type Signal = Arc<dyn Signaler + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

pub trait LocalTrack {
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

#[async_trait]
pub trait MediaDevices {
    /// Audio always, video only for video calls.
    async fn acquire(&self, kind: CallKind) -> super::Result<Vec<Track>>;
}

#[async_trait]
pub trait PeerConnection {
    fn add_track(&self, track: &Track) -> super::Result<()>;

    async fn create_offer(&self) -> super::Result<SessionDescription>;

    async fn create_answer(&self) -> super::Result<SessionDescription>;

    async fn set_local_description(&self, desc: &SessionDescription) -> super::Result<()>;

    async fn set_remote_description(&self, desc: &SessionDescription) -> super::Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> super::Result<()>;

    fn close(&self);
}

#[async_trait]
pub trait PeerFactory {
    async fn connect(&self, peer: &user::Id) -> super::Result<Connection>;
}

/// Outgoing half of the realtime channel.
#[async_trait]
pub trait Signaler {
    async fn send(&self, command: Command) -> super::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}
