use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use service::EventService;
use transport::EventTransport;

use crate::state::AppState;

pub use broadcaster::Broadcaster;
pub use model::{Command, Event};

mod broadcaster;
pub mod context;
mod handler;
pub mod hub;
pub mod model;
pub mod service;
pub mod transport;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn EventService + Send + Sync>;
pub type Transport = Arc<dyn EventTransport + Send + Sync>;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/ws", get(handler::api::ws))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connection {0} is closed")]
    Closed(hub::ConnectionId),

    #[error(transparent)]
    _Publish(#[from] async_nats::PublishError),
    #[error(transparent)]
    _Subscribe(#[from] async_nats::SubscribeError),
}
