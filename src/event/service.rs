use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::call::service::Offer;
use crate::{call, user};

use super::context;
use super::hub::Hub;
use super::{Command, Event};

#[async_trait]
pub trait EventService {
    /// Registers a realtime connection of `user`.
    async fn connect(&self, user: &user::Id) -> (context::Ws, UnboundedReceiver<Event>);

    async fn handle_command(&self, ctx: &context::Ws, command: Command) -> super::Result<()>;

    async fn disconnect(&self, ctx: &context::Ws);
}

#[derive(Clone)]
pub struct EventServiceImpl {
    hub: Hub,
    call_service: call::Service,
}

impl EventServiceImpl {
    pub fn new(hub: Hub, call_service: call::Service) -> Self {
        Self { hub, call_service }
    }
}

#[async_trait]
impl EventService for EventServiceImpl {
    async fn connect(&self, user: &user::Id) -> (context::Ws, UnboundedReceiver<Event>) {
        let conn = self.hub.register(user).await;
        let ctx = context::Ws::new(*user, conn.id, conn.outbox);
        (ctx, conn.inbox)
    }

    async fn handle_command(&self, ctx: &context::Ws, command: Command) -> super::Result<()> {
        let me = &ctx.user;

        match command {
            Command::Register | Command::GetOnlineUsers => {
                let users = self.hub.online().await;
                ctx.reply(Event::OnlineUsers { users })?;
            }
            Command::CallUser {
                conversation_id,
                to,
                offer,
                call_type,
                caller,
                participants,
            } => {
                let offer = Offer {
                    conversation_id,
                    to,
                    offer,
                    call_type,
                    caller,
                    participants,
                };
                self.call_service.call_user(me, offer).await;
            }
            Command::AnswerCall {
                conversation_id,
                to,
                answer,
            } => {
                self.call_service
                    .answer(me, &conversation_id, &to, answer)
                    .await
            }
            Command::IceCandidate {
                conversation_id,
                to,
                candidate,
            } => {
                self.call_service
                    .ice_candidate(me, &conversation_id, &to, candidate)
                    .await
            }
            Command::EndCall { conversation_id } => {
                self.call_service.end(me, &conversation_id).await
            }
            Command::DeclineCall { conversation_id } => {
                self.call_service.decline(me, &conversation_id).await
            }
        }
        Ok(())
    }

    async fn disconnect(&self, ctx: &context::Ws) {
        let last = self.hub.deregister(&ctx.user, ctx.connection).await;
        if last {
            debug!("{} has no connection left", ctx.user);
            self.call_service.disconnect(&ctx.user).await;
        }
    }
}
