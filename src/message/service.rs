use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};

use crate::conversation::model::Participant;
use crate::event::{Broadcaster, Event};
use crate::user::model::UserInfo;
use crate::{contact, conversation, user};

use super::model::{Draft, History, MessageDto};
use super::{Id, Repository};

#[async_trait]
pub trait MessageService {
    /// Validates, persists and fans out a message. The returned copy is
    /// tagged for the sender.
    async fn send(
        &self,
        conversation_id: &conversation::Id,
        sender: &user::Id,
        draft: Draft,
    ) -> super::Result<MessageDto>;

    /// Full history of the conversation. Viewing it marks it as read.
    async fn fetch(
        &self,
        conversation_id: &conversation::Id,
        requester: &user::Id,
    ) -> super::Result<History>;

    async fn delete(
        &self,
        conversation_id: &conversation::Id,
        id: &Id,
        requester: &user::Id,
    ) -> super::Result<()>;
}

#[derive(Clone)]
pub struct MessageServiceImpl {
    repo: Repository,
    conversation_repo: conversation::Repository,
    user_repo: user::Repository,
    contact_service: contact::Service,
    broadcaster: Broadcaster,
}

impl MessageServiceImpl {
    pub fn new(
        repo: Repository,
        conversation_repo: conversation::Repository,
        user_repo: user::Repository,
        contact_service: contact::Service,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            repo,
            conversation_repo,
            user_repo,
            contact_service,
            broadcaster,
        }
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn send(
        &self,
        conversation_id: &conversation::Id,
        sender: &user::Id,
        draft: Draft,
    ) -> super::Result<MessageDto> {
        let conversation = self.conversation_repo.find_by_id(conversation_id)?;
        let participants = self.participants_of(conversation_id, sender)?;

        if conversation.is_direct() {
            if let Some(other) = participants.iter().find(|p| p.user_id != *sender) {
                if let Some(status) = self
                    .contact_service
                    .block_status(sender, &other.user_id)
                    .await?
                {
                    debug!("{sender} cannot write in {conversation_id}: {}", status.as_str());
                    return Err(super::Error::Blocked(status));
                }
            }
        }

        let new = draft.validate(*conversation_id, *sender)?;
        let message = self.repo.append(&new)?;

        let sender_info = match self.user_repo.find_by_id(sender) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("sender {sender} of message {} has no profile: {e}", message.id);
                None
            }
        };
        let dto = MessageDto::new(&message, sender_info.as_ref(), sender);

        for p in &participants {
            let event = Event::NewMessage {
                recipient_id: p.user_id,
                conversation_id: *conversation_id,
                message: dto.for_viewer(&p.user_id),
            };
            self.broadcaster.emit_to_user(&p.user_id, &event).await;
        }

        Ok(dto)
    }

    async fn fetch(
        &self,
        conversation_id: &conversation::Id,
        requester: &user::Id,
    ) -> super::Result<History> {
        let conversation = self.conversation_repo.find_by_id(conversation_id)?;
        let participants = self.participants_of(conversation_id, requester)?;

        let messages = self.repo.find_by_conversation(conversation_id)?;

        let mut sender_ids = messages.iter().map(|m| m.sender).collect::<Vec<_>>();
        sender_ids.sort();
        sender_ids.dedup();
        let senders = self
            .user_repo
            .find_by_ids(&sender_ids)?
            .into_iter()
            .map(|u| (u.id, u))
            .collect::<HashMap<user::Id, UserInfo>>();

        let messages = messages
            .iter()
            .map(|m| MessageDto::new(m, senders.get(&m.sender), requester))
            .collect();

        let block_status = match participants.iter().find(|p| p.user_id != *requester) {
            Some(other) if conversation.is_direct() => {
                self.contact_service
                    .block_status(requester, &other.user_id)
                    .await?
            }
            _ => None,
        };

        self.conversation_repo.mark_read(conversation_id, requester)?;

        Ok(History {
            messages,
            block_status,
            conversation_type: conversation.kind,
        })
    }

    async fn delete(
        &self,
        conversation_id: &conversation::Id,
        id: &Id,
        requester: &user::Id,
    ) -> super::Result<()> {
        let message = self.repo.find_by_id(id)?;
        if message.conversation_id != *conversation_id {
            return Err(super::Error::NotFound(*id));
        }
        if message.sender != *requester {
            return Err(super::Error::NotOwner);
        }
        if message.is_deleted {
            return Ok(());
        }

        self.repo.soft_delete(id)?;

        self.broadcaster
            .emit_to_conversation(
                conversation_id,
                &Event::MessageDeleted {
                    conversation_id: *conversation_id,
                    message_id: *id,
                },
                None,
            )
            .await;

        Ok(())
    }
}

impl MessageServiceImpl {
    /// Participants of the conversation, provided `member` is one of them.
    fn participants_of(
        &self,
        conversation_id: &conversation::Id,
        member: &user::Id,
    ) -> super::Result<Vec<Participant>> {
        let participants = self.conversation_repo.find_participants(conversation_id)?;
        if !participants.iter().any(|p| p.user_id == *member) {
            return Err(conversation::Error::NotMember.into());
        }
        Ok(participants)
    }
}
