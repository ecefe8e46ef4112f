use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error, warn};

use crate::integration::pubsub;
use crate::user;

use super::Event;
use super::hub::Hub;

/// Routes an event into the room of one user. Knows nothing about what
/// the event means.
#[async_trait]
pub trait EventTransport {
    async fn deliver(&self, user: &user::Id, event: &Event) -> super::Result<()>;
}

/// Publishes room events on NATS so that every instance can deliver them
/// to its own connections.
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventTransport for NatsTransport {
    async fn deliver(&self, user: &user::Id, event: &Event) -> super::Result<()> {
        self.client
            .publish(pubsub::room_subject(user), Bytes::from(event))
            .await?;
        Ok(())
    }
}

/// Feeds room events published by any instance into the local hub.
pub async fn bridge(client: &async_nats::Client, hub: Hub) -> super::Result<()> {
    let mut subscriber = client.subscribe(pubsub::ROOMS_WILDCARD).await?;

    tokio::spawn(async move {
        while let Some(msg) = subscriber.next().await {
            let Some(user) = pubsub::room_owner(msg.subject.as_str()) else {
                warn!("ignoring message on foreign subject {}", msg.subject);
                continue;
            };

            match serde_json::from_slice::<Event>(&msg.payload) {
                Ok(event) => {
                    if let Err(e) = hub.deliver(&user, &event).await {
                        error!("failed to deliver bridged event to {user}: {e}");
                    }
                }
                Err(e) => error!("failed to deserialize event: {e:?}"),
            }
        }
        debug!("rooms subscription closed");
    });

    Ok(())
}
