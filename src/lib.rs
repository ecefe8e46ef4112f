use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

pub mod auth;
pub mod call;
pub mod contact;
pub mod conversation;
mod error;
pub mod event;
pub mod integration;
pub mod media;
pub mod message;
mod schema;
pub mod state;
pub mod user;

#[cfg(test)]
mod testing;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Multipart framing on top of the largest accepted file.
const FORM_OVERHEAD: usize = 64 * 1024;

pub fn app(s: AppState) -> Router {
    let media = &s.config.media;

    let authorize = from_fn_with_state(s.clone(), auth::middleware::authorize);

    let api = Router::new()
        .merge(conversation::api(s.clone()))
        .merge(message::api(s.clone()))
        .route_layer(authorize.clone())
        .merge(conversation::assets(s.clone()));
    let ws = event::api(s.clone()).route_layer(authorize);

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .nest("/api", api)
        .merge(ws)
        .nest_service(media::PUBLIC_PREFIX, ServeDir::new(media.dir()))
        .layer(DefaultBodyLimit::max(media.max_bytes() + FORM_OVERHEAD))
        .layer(s.config.env.cors())
        .layer(TraceLayer::new_for_http())
}
