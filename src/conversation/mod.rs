use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repository::ConversationRepository;
use service::ConversationService;

use crate::{contact, media, message, state::AppState, user};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn ConversationRepository + Send + Sync>;
pub type Service = Arc<dyn ConversationService + Send + Sync>;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/conversations", get(handler::api::find_all))
        .route("/conversations/private", post(handler::api::open_private))
        .route("/conversations/group", post(handler::api::create_group))
        .route("/conversations/{id}/members", post(handler::api::add_member))
        .route(
            "/conversations/{id}/members/{user_id}",
            delete(handler::api::remove_member),
        )
        .route("/conversations/{id}/leave", post(handler::api::leave))
        .route("/conversations/{id}/avatar", put(handler::api::update_avatar))
        .route("/conversations/{id}/avatar", delete(handler::api::remove_avatar))
        .with_state(s)
}

/// Routes reachable without a token, e.g. from an `<img>` tag.
pub fn assets<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/conversations/{id}/avatar.png", get(handler::api::generated_avatar))
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
    Direct,
    Group,
}

impl Kind {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            other => Err(Error::UnsupportedKind(other.to_owned())),
        }
    }
}

/// Generated avatar of a conversation that has no uploaded picture.
pub fn generated_avatar_url(id: &Id) -> String {
    format!("/api/conversations/{id}/avatar.png")
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("conversation not found: {0}")]
    NotFound(Id),
    #[error("not a participant of the conversation")]
    NotMember,
    #[error("only the group creator can do this")]
    NotCreator,
    #[error("cannot start a conversation with oneself")]
    SelfReference,
    #[error("missing target user")]
    MissingTarget,
    #[error("operation is only allowed on group conversations")]
    NotGroup,
    #[error("a group needs at least one other member")]
    NotEnoughMembers,
    #[error("selected user does not exist: {0}")]
    NonExistingUser(user::Id),
    #[error("user is already a member: {0}")]
    AlreadyMember(user::Id),
    #[error("user is not a member: {0}")]
    MemberNotFound(user::Id),
    #[error("direct conversation already exists")]
    AlreadyExists,
    #[error("unsupported conversation kind: {0}")]
    UnsupportedKind(String),

    #[error(transparent)]
    _User(#[from] user::Error),
    #[error(transparent)]
    _Contact(#[from] contact::Error),
    #[error(transparent)]
    _Media(#[from] media::Error),
    #[error(transparent)]
    _Message(Box<message::Error>),
    #[error(transparent)]
    _R2d2(#[from] r2d2::Error),
    #[error(transparent)]
    _Diesel(#[from] diesel::result::Error),
}

impl From<message::Error> for Error {
    fn from(e: message::Error) -> Self {
        Self::_Message(Box::new(e))
    }
}
