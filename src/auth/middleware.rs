use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use log::debug;
use serde::Deserialize;

use crate::auth;

#[derive(Deserialize)]
pub struct TokenParams {
    token: Option<String>,
}

/// Accepts a bearer token from the `Authorization` header or, for
/// websocket upgrades where browsers cannot set headers, from `?token=`.
pub async fn authorize(
    State(auth_service): State<auth::Service>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(params): Query<TokenParams>,
    mut req: Request,
    next: Next,
) -> crate::Result<Response> {
    let token = match (&bearer, &params.token) {
        (Some(TypedHeader(Authorization(bearer))), _) => bearer.token(),
        (None, Some(token)) => token.as_str(),
        (None, None) => {
            debug!("No token found for {}", req.uri().path());
            return Err(auth::Error::Unauthorized.into());
        }
    };

    let id = auth_service.validate(token).await?;
    req.extensions_mut().insert(auth::User::new(id));

    Ok(next.run(req).await)
}
