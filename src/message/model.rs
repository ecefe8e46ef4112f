use chrono::NaiveDateTime;
use diesel::prelude::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::model::UserInfo;
use crate::{contact, conversation, user};

use super::{Id, Kind};

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: Id,
    pub conversation_id: conversation::Id,
    pub sender: user::Id,
    pub content: Option<String>,
    pub kind: Kind,
    pub media_ref: Option<String>,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

impl Message {
    /// A message is unread by `viewer` when someone else sent it strictly
    /// after the viewer's read pointer.
    pub fn is_unread_for(&self, viewer: &user::Id, last_read_at: Option<NaiveDateTime>) -> bool {
        self.sender != *viewer
            && !self.is_deleted
            && last_read_at.is_none_or(|read| self.created_at > read)
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: Option<String>,
    kind: String,
    media_ref: Option<String>,
    is_deleted: bool,
    created_at: NaiveDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = super::Error;

    fn try_from(r: MessageRow) -> super::Result<Self> {
        Ok(Self {
            id: Id::from(r.id),
            conversation_id: conversation::Id::from(r.conversation_id),
            sender: user::Id::from(r.sender_id),
            content: r.content,
            kind: r.kind.parse()?,
            media_ref: r.media_ref,
            is_deleted: r.is_deleted,
            created_at: r.created_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub conversation_id: conversation::Id,
    pub sender: user::Id,
    pub content: Option<String>,
    pub kind: Kind,
    pub media_ref: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::messages)]
pub struct NewMessageRow<'a> {
    id: Uuid,
    conversation_id: &'a Uuid,
    sender_id: &'a Uuid,
    content: Option<&'a str>,
    kind: &'a str,
    media_ref: Option<&'a str>,
}

impl<'a> From<&'a NewMessage> for NewMessageRow<'a> {
    fn from(m: &'a NewMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: m.conversation_id.get(),
            sender_id: m.sender.get(),
            content: m.content.as_deref(),
            kind: m.kind.as_str(),
            media_ref: m.media_ref.as_deref(),
        }
    }
}

/// What a client asks to send, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Draft {
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<Kind>,
    #[serde(skip)]
    pub media_ref: Option<String>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn validate(
        self,
        conversation_id: conversation::Id,
        sender: user::Id,
    ) -> super::Result<NewMessage> {
        let content = self
            .content
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());

        let kind = match (self.kind, &self.media_ref) {
            (Some(k), _) => k,
            (None, Some(_)) => Kind::File,
            (None, None) => Kind::Text,
        };

        if kind.is_media() && self.media_ref.is_none() {
            return Err(super::Error::MissingMedia(kind));
        }
        if content.is_none() && self.media_ref.is_none() {
            return Err(super::Error::Empty);
        }
        if kind == Kind::Text && content.is_none() {
            return Err(super::Error::Empty);
        }

        Ok(NewMessage {
            conversation_id,
            sender,
            content,
            kind,
            media_ref: self.media_ref,
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Me,
    Them,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Id,
    pub conversation_id: conversation::Id,
    pub sender_id: user::Id,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Kind,
    pub media_ref: Option<String>,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub from: Origin,
}

impl MessageDto {
    pub fn new(m: &Message, sender: Option<&UserInfo>, viewer: &user::Id) -> Self {
        let (content, media_ref) = if m.is_deleted {
            (None, None)
        } else {
            (m.content.clone(), m.media_ref.clone())
        };

        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender,
            sender_name: sender.map(|s| s.name.clone()).unwrap_or_default(),
            sender_avatar: sender.and_then(|s| s.avatar.clone()),
            content,
            kind: m.kind,
            media_ref,
            deleted: m.is_deleted,
            created_at: m.created_at,
            from: origin(&m.sender, viewer),
        }
    }

    /// Same message as seen by `viewer`.
    pub fn for_viewer(&self, viewer: &user::Id) -> Self {
        Self {
            from: origin(&self.sender_id, viewer),
            ..self.clone()
        }
    }
}

fn origin(sender: &user::Id, viewer: &user::Id) -> Origin {
    if sender == viewer {
        Origin::Me
    } else {
        Origin::Them
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub messages: Vec<MessageDto>,
    pub block_status: Option<contact::BlockStatus>,
    pub conversation_type: conversation::Kind,
}
