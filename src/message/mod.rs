use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repository::MessageRepository;
use service::MessageService;

use crate::{contact, conversation, state::AppState, user};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn MessageRepository + Send + Sync>;
pub type Service = Arc<dyn MessageService + Send + Sync>;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route(
            "/conversations/{id}/messages",
            get(handler::api::find_all).post(handler::api::create),
        )
        .route(
            "/conversations/{id}/messages/{message_id}",
            delete(handler::api::delete),
        )
        .with_state(s)
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn get(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Text,
    Image,
    Audio,
    File,
}

impl Kind {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }

    pub const fn is_media(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "file" => Ok(Self::File),
            other => Err(Error::UnsupportedKind(other.to_owned())),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("message not found: {0}")]
    NotFound(Id),
    #[error("not owner of message")]
    NotOwner,
    #[error("message has neither text nor attachment")]
    Empty,
    #[error("{0:?} message requires an attachment")]
    MissingMedia(Kind),
    #[error("unsupported message kind: {0}")]
    UnsupportedKind(String),
    #[error("messaging is blocked ({})", .0.as_str())]
    Blocked(contact::BlockStatus),

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _User(#[from] user::Error),
    #[error(transparent)]
    _Contact(#[from] contact::Error),
    #[error(transparent)]
    _R2d2(#[from] r2d2::Error),
    #[error(transparent)]
    _Diesel(#[from] diesel::result::Error),
}
