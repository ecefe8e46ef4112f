use std::env;

use bytes::Bytes;
use log::{error, warn};

use crate::{event, user};

#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 4222,
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        let host = env::var("NATS_HOST").ok();
        let port = env::var("NATS_PORT")
            .unwrap_or_else(|_| "4222".to_string())
            .parse()
            .ok();

        if let (Some(host), Some(port)) = (host, port) {
            Some(Self { host, port })
        } else {
            warn!("NATS env is not configured, realtime events stay in-process");
            None
        }
    }

    pub async fn connect(&self) -> async_nats::Client {
        match async_nats::connect(&format!("{}:{}", self.host, self.port)).await {
            Ok(con) => con,
            Err(e) => panic!("Failed to connect to NATS: {e}"),
        }
    }
}

pub const ROOMS_WILDCARD: &str = "rooms.*";
/// Call registry transitions shared by every instance.
pub const CALL_SESSIONS: &str = "calls.sessions";

pub fn room_subject(user: &user::Id) -> async_nats::Subject {
    format!("rooms.{user}").into()
}

pub fn room_owner(subject: &str) -> Option<user::Id> {
    subject
        .strip_prefix("rooms.")
        .and_then(|id| id.parse::<uuid::Uuid>().ok())
        .map(user::Id::from)
}

impl From<&event::Event> for Bytes {
    fn from(e: &event::Event) -> Self {
        let mut bytes: Vec<u8> = Vec::new();
        if let Err(e) = serde_json::to_writer(&mut bytes, e) {
            error!("could not serialize event: {e:?}");
        }
        bytes.into()
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn should_resolve_room_owner_from_subject() {
        let user = user::Id::from(Uuid::new_v4());
        let subject = room_subject(&user);

        assert_eq!(room_owner(subject.as_str()), Some(user));
    }

    #[test]
    fn should_not_resolve_foreign_subject() {
        assert_eq!(room_owner("noti.whatever"), None);
        assert_eq!(room_owner("rooms.not-a-uuid"), None);
    }
}
