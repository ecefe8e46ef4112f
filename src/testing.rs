use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use uuid::Uuid;

use crate::contact::repository::ContactRepository;
use crate::conversation::model::{Conversation, Departure, NewConversation, Participant};
use crate::conversation::repository::ConversationRepository;
use crate::event::transport::EventTransport;
use crate::event::Event;
use crate::media::store::MediaStore;
use crate::message::model::{Message, NewMessage};
use crate::message::repository::MessageRepository;
use crate::user::model::UserInfo;
use crate::user::repository::UserRepository;
use crate::{contact, conversation, event, media, message, user};

#[derive(Default)]
struct State {
    tick: i64,
    users: HashMap<user::Id, UserInfo>,
    friends: HashSet<(user::Id, user::Id)>,
    blocks: HashSet<(user::Id, user::Id)>,
    conversations: HashMap<conversation::Id, Conversation>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
}

impl State {
    /// Strictly increasing clock, one second per call.
    fn now(&mut self) -> NaiveDateTime {
        self.tick += 1;
        epoch() + TimeDelta::seconds(self.tick)
    }

    fn participant_mut(
        &mut self,
        id: &conversation::Id,
        user: &user::Id,
    ) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.conversation_id == *id && p.user_id == *user)
    }
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap()
}

fn pair(a: &user::Id, b: &user::Id) -> (user::Id, user::Id) {
    if a <= b { (*a, *b) } else { (*b, *a) }
}

/// In-memory stand-in for every repository, following the same ordering
/// and read pointer rules as the Postgres implementations.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, name: &str) -> user::Id {
        let id = user::Id::random();
        self.state
            .lock()
            .unwrap()
            .users
            .insert(id, UserInfo::new(id, name, None));
        id
    }

    pub fn befriend(&self, a: &user::Id, b: &user::Id) {
        self.state.lock().unwrap().friends.insert(pair(a, b));
    }

    pub fn block(&self, blocker: &user::Id, blocked: &user::Id) {
        self.state
            .lock()
            .unwrap()
            .blocks
            .insert((*blocker, *blocked));
    }

    pub fn messages_of(&self, id: &conversation::Id) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == *id)
            .cloned()
            .collect()
    }
}

impl UserRepository for MemoryStore {
    fn find_by_id(&self, id: &user::Id) -> Result<UserInfo, user::Error> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(id)
            .cloned()
            .ok_or(user::Error::NotFound(*id))
    }

    fn find_by_ids(&self, ids: &[user::Id]) -> Result<Vec<UserInfo>, user::Error> {
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }
}

impl ContactRepository for MemoryStore {
    fn are_friends(&self, a: &user::Id, b: &user::Id) -> Result<bool, contact::Error> {
        Ok(self.state.lock().unwrap().friends.contains(&pair(a, b)))
    }

    fn has_blocked(&self, blocker: &user::Id, blocked: &user::Id) -> Result<bool, contact::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocks
            .contains(&(*blocker, *blocked)))
    }
}

impl ConversationRepository for MemoryStore {
    fn find_by_id(&self, id: &conversation::Id) -> Result<Conversation, conversation::Error> {
        self.state
            .lock()
            .unwrap()
            .conversations
            .get(id)
            .cloned()
            .ok_or(conversation::Error::NotFound(*id))
    }

    fn find_direct(
        &self,
        a: &user::Id,
        b: &user::Id,
    ) -> Result<Option<Conversation>, conversation::Error> {
        let state = self.state.lock().unwrap();
        let is_member = |c: &Conversation, u: &user::Id| {
            state
                .participants
                .iter()
                .any(|p| p.conversation_id == c.id && p.user_id == *u)
        };

        Ok(state
            .conversations
            .values()
            .find(|c| c.is_direct() && is_member(c, a) && is_member(c, b))
            .cloned())
    }

    fn find_by_member(&self, user: &user::Id) -> Result<Vec<Conversation>, conversation::Error> {
        let state = self.state.lock().unwrap();
        let mut found = state
            .participants
            .iter()
            .filter(|p| p.user_id == *user)
            .filter_map(|p| state.conversations.get(&p.conversation_id).cloned())
            .collect::<Vec<_>>();
        found.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(found)
    }

    fn create(&self, c: &NewConversation) -> Result<Conversation, conversation::Error> {
        if let [a, b] = c.members.as_slice()
            && c.direct_key().is_some()
            && self.find_direct(a, b)?.is_some()
        {
            return Err(conversation::Error::AlreadyExists);
        }

        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let created = Conversation {
            id: conversation::Id::from(Uuid::new_v4()),
            kind: c.kind,
            title: c.title.clone(),
            avatar: None,
            creator: c.creator,
            last_message_at: now,
            created_at: now,
        };
        state.conversations.insert(created.id, created.clone());
        for m in &c.members {
            state.participants.push(Participant {
                conversation_id: created.id,
                user_id: *m,
                last_read_at: None,
                joined_at: now,
            });
        }

        Ok(created)
    }

    fn find_participants(
        &self,
        id: &conversation::Id,
    ) -> Result<Vec<Participant>, conversation::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .participants
            .iter()
            .filter(|p| p.conversation_id == *id)
            .cloned()
            .collect())
    }

    fn find_participant(
        &self,
        id: &conversation::Id,
        user: &user::Id,
    ) -> Result<Option<Participant>, conversation::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .participants
            .iter()
            .find(|p| p.conversation_id == *id && p.user_id == *user)
            .cloned())
    }

    fn add_participant(
        &self,
        id: &conversation::Id,
        user: &user::Id,
    ) -> Result<(), conversation::Error> {
        let mut state = self.state.lock().unwrap();
        if state.participant_mut(id, user).is_some() {
            return Err(conversation::Error::AlreadyMember(*user));
        }

        let now = state.now();
        state.participants.push(Participant {
            conversation_id: *id,
            user_id: *user,
            last_read_at: None,
            joined_at: now,
        });
        Ok(())
    }

    fn remove_participant(
        &self,
        id: &conversation::Id,
        user: &user::Id,
    ) -> Result<Departure, conversation::Error> {
        let mut state = self.state.lock().unwrap();
        let creator = state
            .conversations
            .get(id)
            .map(|c| c.creator)
            .ok_or(conversation::Error::NotFound(*id))?;

        let before = state.participants.len();
        state
            .participants
            .retain(|p| !(p.conversation_id == *id && p.user_id == *user));
        if state.participants.len() == before {
            return Err(conversation::Error::MemberNotFound(*user));
        }

        let successor = state
            .participants
            .iter()
            .find(|p| p.conversation_id == *id)
            .map(|p| p.user_id);

        let Some(successor) = successor else {
            state.messages.retain(|m| m.conversation_id != *id);
            state.conversations.remove(id);
            return Ok(Departure::Dissolved);
        };

        if creator != *user {
            return Ok(Departure::Left { new_creator: None });
        }
        if let Some(c) = state.conversations.get_mut(id) {
            c.creator = successor;
        }
        Ok(Departure::Left {
            new_creator: Some(successor),
        })
    }

    fn set_avatar(
        &self,
        id: &conversation::Id,
        avatar: Option<&str>,
    ) -> Result<(), conversation::Error> {
        let mut state = self.state.lock().unwrap();
        let c = state
            .conversations
            .get_mut(id)
            .ok_or(conversation::Error::NotFound(*id))?;
        c.avatar = avatar.map(str::to_owned);
        Ok(())
    }

    fn mark_read(&self, id: &conversation::Id, user: &user::Id) -> Result<(), conversation::Error> {
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        if let Some(p) = state.participant_mut(id, user)
            && p.last_read_at.is_none_or(|read| read < now)
        {
            p.last_read_at = Some(now);
        }
        Ok(())
    }
}

impl MessageRepository for MemoryStore {
    fn append(&self, m: &NewMessage) -> Result<Message, message::Error> {
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let created = Message {
            id: message::Id::from(Uuid::new_v4()),
            conversation_id: m.conversation_id,
            sender: m.sender,
            content: m.content.clone(),
            kind: m.kind,
            media_ref: m.media_ref.clone(),
            is_deleted: false,
            created_at: now,
        };
        state.messages.push(created.clone());

        if let Some(c) = state.conversations.get_mut(&m.conversation_id) {
            c.last_message_at = now;
        }
        if let Some(p) = state.participant_mut(&m.conversation_id, &m.sender)
            && p.last_read_at.is_none_or(|read| read < now)
        {
            p.last_read_at = Some(now);
        }

        Ok(created)
    }

    fn find_by_id(&self, id: &message::Id) -> Result<Message, message::Error> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == *id)
            .cloned()
            .ok_or(message::Error::NotFound(*id))
    }

    fn find_by_conversation(&self, id: &conversation::Id) -> Result<Vec<Message>, message::Error> {
        Ok(self.messages_of(id))
    }

    fn find_last(&self, id: &conversation::Id) -> Result<Option<Message>, message::Error> {
        Ok(self.messages_of(id).pop())
    }

    fn count_unread(
        &self,
        id: &conversation::Id,
        viewer: &user::Id,
        last_read_at: Option<NaiveDateTime>,
    ) -> Result<i64, message::Error> {
        let unread = self
            .messages_of(id)
            .iter()
            .filter(|m| m.is_unread_for(viewer, last_read_at))
            .count();
        Ok(unread as i64)
    }

    fn soft_delete(&self, id: &message::Id) -> Result<(), message::Error> {
        let mut state = self.state.lock().unwrap();
        let m = state
            .messages
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or(message::Error::NotFound(*id))?;
        m.is_deleted = true;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn store(&self, upload: &media::Upload) -> Result<String, media::Error> {
        if upload.bytes().is_empty() {
            return Err(media::Error::Empty);
        }
        Ok(format!(
            "{}/{}.{}",
            media::PUBLIC_PREFIX,
            Uuid::new_v4(),
            upload.extension()
        ))
    }
}

/// Transport that keeps every delivered event per recipient.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    delivered: Arc<Mutex<Vec<(user::Id, Event)>>>,
}

impl RecordingTransport {
    pub fn events_for(&self, user: &user::Id) -> Vec<Event> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == user)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl EventTransport for RecordingTransport {
    async fn deliver(&self, user: &user::Id, event: &Event) -> Result<(), event::Error> {
        self.delivered.lock().unwrap().push((*user, event.clone()));
        Ok(())
    }
}
