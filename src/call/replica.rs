use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::integration::pubsub;

use super::registry::Transition;
use super::service::CallServiceImpl;

/// A registry transition tagged with the instance that made it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub origin: Uuid,
    pub transition: Transition,
}

/// Shares call registry transitions with the other instances.
#[async_trait]
pub trait SessionReplicator {
    async fn publish(&self, update: &Update) -> super::Result<()>;
}

/// Single instance setup, nobody to tell.
pub struct LocalReplicator;

#[async_trait]
impl SessionReplicator for LocalReplicator {
    async fn publish(&self, _update: &Update) -> super::Result<()> {
        Ok(())
    }
}

pub struct NatsReplicator {
    client: async_nats::Client,
}

impl NatsReplicator {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionReplicator for NatsReplicator {
    async fn publish(&self, update: &Update) -> super::Result<()> {
        let payload = serde_json::to_vec(update)?;
        self.client
            .publish(pubsub::CALL_SESSIONS, Bytes::from(payload))
            .await?;
        Ok(())
    }
}

/// Replays transitions published by the other instances on the registry
/// of `service`.
pub async fn bridge(client: &async_nats::Client, service: CallServiceImpl) -> super::Result<()> {
    let mut subscriber = client.subscribe(pubsub::CALL_SESSIONS).await?;

    tokio::spawn(async move {
        while let Some(msg) = subscriber.next().await {
            match serde_json::from_slice::<Update>(&msg.payload) {
                Ok(update) => service.replay(&update).await,
                Err(e) => error!("failed to deserialize call update: {e:?}"),
            }
        }
        debug!("call sessions subscription closed");
    });

    Ok(())
}
