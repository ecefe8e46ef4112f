use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::warn;

use crate::user;

use super::{Config, TokenClaims};

#[async_trait]
pub trait AuthService {
    /// Returns the user a bearer token was issued to.
    async fn validate(&self, token: &str) -> super::Result<user::Id>;
}

#[derive(Clone)]
pub struct JwtAuthService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthService {
    pub fn new(config: &Config) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn validate(&self, token: &str) -> super::Result<user::Id> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| {
                warn!("Failed to decode token claims: {e:?}");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::Base64(_)
                    | jsonwebtoken::errors::ErrorKind::Json(_)
                    | jsonwebtoken::errors::ErrorKind::Utf8(_) => super::Error::TokenMalformed,
                    _ => super::Error::Unauthorized,
                }
            })
    }
}
