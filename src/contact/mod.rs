use std::sync::Arc;

use serde::{Deserialize, Serialize};

use repository::ContactRepository;
use service::ContactService;

use crate::user;

pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn ContactRepository + Send + Sync>;
pub type Service = Arc<dyn ContactService + Send + Sync>;

/// Which side of a pair put the block in place, seen from the asking user.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    IBlocked,
    TheyBlocked,
}

impl BlockStatus {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::IBlocked => "i_blocked",
            Self::TheyBlocked => "they_blocked",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} is not an accepted friend")]
    NotFriends(user::Id),
    #[error("{0} is blocked")]
    TargetBlocked(user::Id),

    #[error(transparent)]
    _R2d2(#[from] r2d2::Error),
    #[error(transparent)]
    _Diesel(#[from] diesel::result::Error),
}

impl From<Error> for axum::http::StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFriends(_) | Error::TargetBlocked(_) => Self::FORBIDDEN,
            Error::_R2d2(_) | Error::_Diesel(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}
