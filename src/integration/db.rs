use std::env;
use std::time::Duration;

use diesel::PgConnection;
use diesel::r2d2::ConnectionManager;

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct Config {
    url: String,
    pool_size: u32,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 10,
        }
    }

    pub fn env() -> Self {
        let url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool_size = env::var("DATABASE_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Self { url, pool_size }
    }

    pub fn connect(&self) -> Pool {
        let manager = ConnectionManager::<PgConnection>::new(&self.url);

        match r2d2::Pool::builder()
            .max_size(self.pool_size)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
        {
            Ok(pool) => pool,
            Err(e) => panic!("Failed to connect to Postgres: {e}"),
        }
    }
}
