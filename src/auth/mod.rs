use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::user;

pub mod middleware;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::AuthService + Send + Sync>;

/// Token issuance lives in the account service; this crate only checks
/// tokens signed with the shared secret.
#[derive(Clone)]
pub struct Config {
    secret: String,
}

impl Config {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config").field("secret", &"***").finish()
    }
}

#[derive(Deserialize, Serialize, Clone)]
struct TokenClaims {
    sub: user::Id,
    exp: u64,
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct User {
    id: user::Id,
}

impl User {
    pub fn new(id: user::Id) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &user::Id {
        &self.id
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unauthorized to access the resource")]
    Unauthorized,
    #[error("token is malformed")]
    TokenMalformed,

    #[error(transparent)]
    _JsonWebtoken(#[from] jsonwebtoken::errors::Error),
}

impl From<Error> for axum::http::StatusCode {
    fn from(_: Error) -> Self {
        Self::UNAUTHORIZED
    }
}
