use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use replica::SessionReplicator;
use service::CallService;

use crate::{conversation, user};

pub mod coordinator;
pub mod peer;
pub mod registry;
pub mod replica;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn CallService + Send + Sync>;
pub type Replicator = Arc<dyn SessionReplicator + Send + Sync>;

/// Upper bound of participants in one call. Every client keeps a peer
/// connection to each other participant, so cost grows quadratically.
pub const MAX_PARTICIPANTS: usize = 8;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    pub const fn has_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

/// Display info of whoever placed the call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallerInfo {
    pub id: user::Id,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Hangup,
    Timeout,
    Disconnected,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    Busy,
    NotMember,
    TooManyParticipants,
}

#[derive(Clone)]
pub struct Config {
    ring_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(45),
        }
    }
}

impl Config {
    pub fn new(ring_timeout: Duration) -> Self {
        Self { ring_timeout }
    }

    pub fn env() -> Option<Self> {
        match env::var("CALL_RING_TIMEOUT").map(|s| s.parse::<u64>()) {
            Ok(Ok(secs)) => Some(Self::new(Duration::from_secs(secs))),
            Ok(Err(e)) => {
                warn!("invalid CALL_RING_TIMEOUT, using default: {e}");
                None
            }
            Err(_) => None,
        }
    }

    pub const fn ring_timeout(&self) -> Duration {
        self.ring_timeout
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not acquire local media: {0}")]
    Media(String),
    #[error("peer connection failed: {0}")]
    PeerConnection(String),
    #[error("could not send signal: {0}")]
    Signaling(String),
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Publish(#[from] async_nats::PublishError),
    #[error(transparent)]
    _Subscribe(#[from] async_nats::SubscribeError),
    #[error(transparent)]
    _Json(#[from] serde_json::Error),
}
