use std::env;
use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use axum::http::HeaderValue;
use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{auth, call, media};

pub mod db;
pub mod pubsub;

/// Deployment stage, read from `ENV`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Local,
    Dev,
    Stage,
    Production,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "stg" => Ok(Self::Stage),
            "prod" => Ok(Self::Production),
            other => Err(format!("Invalid environment: {other}")),
        }
    }
}

impl Env {
    const PORT: u16 = 8000;

    pub fn addr(&self) -> SocketAddr {
        let ip = match self {
            Self::Local => Ipv4Addr::LOCALHOST,
            Self::Dev | Self::Stage | Self::Production => Ipv4Addr::UNSPECIFIED,
        };
        SocketAddr::from((ip, Self::PORT))
    }

    /// Browsers of any origin may call local and dev instances; staged and
    /// production ones only accept the origins listed in `ALLOW_ORIGIN`.
    pub fn cors(&self) -> CorsLayer {
        let origin = match self {
            Self::Local | Self::Dev => AllowOrigin::any(),
            Self::Stage | Self::Production => AllowOrigin::list(allowed_origins()),
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

fn allowed_origins() -> Vec<HeaderValue> {
    env::var("ALLOW_ORIGIN")
        .expect("ALLOW_ORIGIN must be set")
        .split(',')
        .map(|o| HeaderValue::from_str(o.trim()).expect("invalid ALLOW_ORIGIN value"))
        .collect()
}

#[derive(Clone)]
pub struct Config {
    pub env: Env,

    pub db: db::Config,
    pub pubsub: Option<pubsub::Config>,

    pub auth: auth::Config,
    pub media: media::Config,
    pub call: call::Config,
}

impl Default for Config {
    fn default() -> Self {
        dotenv().ok();

        init_logger();

        let env = match env::var("ENV") {
            Ok(stage) => stage.parse().unwrap_or_else(|e: String| panic!("{e}")),
            Err(_) => Env::Local,
        };

        Self {
            env,
            db: db::Config::env(),
            pubsub: pubsub::Config::env(),
            auth: auth::Config::new(env::var("JWT_SECRET").expect("JWT_SECRET must be set")),
            media: media::Config::env().unwrap_or_default(),
            call: call::Config::env().unwrap_or_default(),
        }
    }
}

fn init_logger() {
    let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
    let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);
    let log_file = env::var("SERVICE_NAME")
        .map(|pkg| format!("{pkg}.log"))
        .unwrap_or("parlons.log".into());

    CombinedLogger::init(vec![
        TermLogger::new(
            level,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            level,
            simplelog::Config::default(),
            File::create(log_file).expect("Failed to create log file"),
        ),
    ])
    .expect("Failed to initialize logger");
}
