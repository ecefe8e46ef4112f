use log::{error, info};
use tokio::net::TcpListener;

use parlons::integration;
use parlons::state::AppState;

#[tokio::main]
async fn main() {
    let config = integration::Config::default();
    let addr = config.env.addr();

    let app = parlons::app(AppState::init(config).await);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => panic!("Failed to bind {addr}: {e}"),
    };
    info!("listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("server stopped: {e}");
    }
}
