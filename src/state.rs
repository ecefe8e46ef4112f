use std::sync::Arc;

use axum::extract::FromRef;

use crate::call::replica::{self, LocalReplicator, NatsReplicator};
use crate::call::service::CallServiceImpl;
use crate::contact::repository::PgContactRepository;
use crate::contact::service::ContactServiceImpl;
use crate::conversation::repository::PgConversationRepository;
use crate::conversation::service::ConversationServiceImpl;
use crate::event::hub::Hub;
use crate::event::service::EventServiceImpl;
use crate::event::transport::{self, NatsTransport};
use crate::event::Broadcaster;
use crate::integration;
use crate::media::store::FsMediaStore;
use crate::message::repository::PgMessageRepository;
use crate::message::service::MessageServiceImpl;
use crate::user::repository::PgUserRepository;
use crate::{auth, call, contact, conversation, event, media, message, user};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: integration::Config,

    pub auth_service: auth::Service,
    pub conversation_service: conversation::Service,
    pub message_service: message::Service,
    pub call_service: call::Service,
    pub event_service: event::Service,
    pub media_store: media::Store,
}

impl AppState {
    pub async fn init(config: integration::Config) -> Self {
        let pool = config.db.connect();

        let user_repo: user::Repository = Arc::new(PgUserRepository::new(pool.clone()));
        let conversation_repo: conversation::Repository =
            Arc::new(PgConversationRepository::new(pool.clone()));
        let message_repo: message::Repository = Arc::new(PgMessageRepository::new(pool.clone()));
        let contact_service: contact::Service = Arc::new(ContactServiceImpl::new(Arc::new(
            PgContactRepository::new(pool),
        )));

        let hub = Hub::default();
        let nats = match &config.pubsub {
            Some(pubsub) => Some(pubsub.connect().await),
            None => None,
        };
        let (transport, replicator): (event::Transport, call::Replicator) = match &nats {
            Some(client) => {
                if let Err(e) = transport::bridge(client, hub.clone()).await {
                    panic!("Failed to subscribe to rooms: {e}");
                }
                (
                    Arc::new(NatsTransport::new(client.clone())),
                    Arc::new(NatsReplicator::new(client.clone())),
                )
            }
            None => (Arc::new(hub.clone()), Arc::new(LocalReplicator)),
        };
        let broadcaster = Broadcaster::new(transport, conversation_repo.clone());

        let media_store: media::Store = match FsMediaStore::new(&config.media).await {
            Ok(store) => Arc::new(store),
            Err(e) => panic!("Failed to prepare media directory: {e}"),
        };

        let calls = CallServiceImpl::new(
            conversation_repo.clone(),
            broadcaster.clone(),
            replicator,
            config.call.clone(),
        );
        if let Some(client) = &nats
            && let Err(e) = replica::bridge(client, calls.clone()).await
        {
            panic!("Failed to subscribe to call sessions: {e}");
        }
        let call_service: call::Service = Arc::new(calls);

        Self {
            auth_service: Arc::new(auth::service::JwtAuthService::new(&config.auth)),
            conversation_service: Arc::new(ConversationServiceImpl::new(
                conversation_repo.clone(),
                message_repo.clone(),
                user_repo.clone(),
                contact_service.clone(),
                media_store.clone(),
                broadcaster.clone(),
            )),
            message_service: Arc::new(MessageServiceImpl::new(
                message_repo,
                conversation_repo,
                user_repo,
                contact_service,
                broadcaster,
            )),
            event_service: Arc::new(EventServiceImpl::new(hub, call_service.clone())),
            call_service,
            media_store,
            config,
        }
    }
}
