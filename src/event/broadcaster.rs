use log::error;

use crate::{conversation, user};

use super::{Event, Transport};

/// Fan-out capability handed to the message pipeline and to call
/// signaling. Delivery failures are logged, never returned.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Transport,
    conversation_repo: conversation::Repository,
}

impl Broadcaster {
    pub fn new(transport: Transport, conversation_repo: conversation::Repository) -> Self {
        Self {
            transport,
            conversation_repo,
        }
    }

    pub async fn emit_to_user(&self, user: &user::Id, event: &Event) {
        if let Err(e) = self.transport.deliver(user, event).await {
            error!("failed to deliver event to {user}: {e}");
        }
    }

    /// Delivers `event` to every participant of the conversation but
    /// `except`.
    pub async fn emit_to_conversation(
        &self,
        conversation_id: &conversation::Id,
        event: &Event,
        except: Option<&user::Id>,
    ) {
        let participants = match self.conversation_repo.find_participants(conversation_id) {
            Ok(ps) => ps,
            Err(e) => {
                error!("failed to load participants of {conversation_id}: {e}");
                return;
            }
        };

        for p in participants
            .iter()
            .filter(|p| Some(&p.user_id) != except)
        {
            self.emit_to_user(&p.user_id, event).await;
        }
    }
}
