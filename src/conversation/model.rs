use chrono::{NaiveDateTime, TimeDelta};
use diesel::prelude::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{message, user};

use super::{Id, Kind};

#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: Id,
    pub kind: Kind,
    pub title: Option<String>,
    pub avatar: Option<String>,
    pub creator: user::Id,
    pub last_message_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Conversation {
    pub fn is_direct(&self) -> bool {
        self.kind == Kind::Direct
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConversationRow {
    id: Uuid,
    kind: String,
    title: Option<String>,
    avatar: Option<String>,
    creator_id: Uuid,
    last_message_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = super::Error;

    fn try_from(r: ConversationRow) -> super::Result<Self> {
        Ok(Self {
            id: Id::from(r.id),
            kind: r.kind.parse()?,
            title: r.title,
            avatar: r.avatar,
            creator: user::Id::from(r.creator_id),
            last_message_at: r.last_message_at,
            created_at: r.created_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub conversation_id: Id,
    pub user_id: user::Id,
    pub last_read_at: Option<NaiveDateTime>,
    pub joined_at: NaiveDateTime,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::participants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ParticipantRow {
    conversation_id: Uuid,
    user_id: Uuid,
    last_read_at: Option<NaiveDateTime>,
    joined_at: NaiveDateTime,
}

impl From<ParticipantRow> for Participant {
    fn from(r: ParticipantRow) -> Self {
        Self {
            conversation_id: Id::from(r.conversation_id),
            user_id: user::Id::from(r.user_id),
            last_read_at: r.last_read_at,
            joined_at: r.joined_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::participants)]
pub struct NewParticipantRow<'a> {
    id: Uuid,
    conversation_id: &'a Uuid,
    user_id: &'a Uuid,
}

impl<'a> NewParticipantRow<'a> {
    pub fn new(conversation_id: &'a Id, user_id: &'a user::Id) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.get(),
            user_id: user_id.get(),
        }
    }
}

/// A conversation to be created together with its initial participants.
/// `members` always includes the creator.
#[derive(Clone, Debug, PartialEq)]
pub struct NewConversation {
    pub kind: Kind,
    pub title: Option<String>,
    pub creator: user::Id,
    pub members: Vec<user::Id>,
}

impl NewConversation {
    pub fn direct(creator: user::Id, other: user::Id) -> Self {
        Self {
            kind: Kind::Direct,
            title: None,
            creator,
            members: vec![creator, other],
        }
    }

    pub fn group(creator: user::Id, title: Option<String>, others: &[user::Id]) -> Self {
        let mut members = Vec::with_capacity(others.len() + 1);
        members.push(creator);
        for m in others {
            if !members.contains(m) {
                members.push(*m);
            }
        }

        Self {
            kind: Kind::Group,
            title,
            creator,
            members,
        }
    }

    pub fn direct_key(&self) -> Option<String> {
        match (self.kind, self.members.as_slice()) {
            (Kind::Direct, [a, b]) => Some(direct_key(a, b)),
            _ => None,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::conversations)]
pub struct NewConversationRow<'a> {
    id: Uuid,
    kind: &'a str,
    title: Option<&'a str>,
    creator_id: &'a Uuid,
    direct_key: Option<String>,
}

impl<'a> From<&'a NewConversation> for NewConversationRow<'a> {
    fn from(c: &'a NewConversation) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: c.kind.as_str(),
            title: c.title.as_deref(),
            creator_id: c.creator.get(),
            direct_key: c.direct_key(),
        }
    }
}

impl NewConversationRow<'_> {
    pub const fn id(&self) -> &Uuid {
        &self.id
    }
}

/// Key identifying the direct conversation of an unordered user pair.
pub fn direct_key(a: &user::Id, b: &user::Id) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// What happened to a group after one of its participants went away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Departure {
    /// The last participant left; the conversation and its messages are gone.
    Dissolved,
    Left {
        new_creator: Option<user::Id>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: Kind,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_user_id: Option<user::Id>,
    pub creator_id: user::Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Preview>,
    pub last_message_at: NaiveDateTime,
    pub unread_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub sender_id: user::Id,
    pub text: String,
    pub time: String,
}

impl Preview {
    pub fn new(m: &message::model::Message, now: NaiveDateTime) -> Self {
        Self {
            sender_id: m.sender,
            text: preview_text(m),
            time: relative_time(m.created_at, now),
        }
    }
}

fn preview_text(m: &message::model::Message) -> String {
    if m.is_deleted {
        return "Message supprimé".to_owned();
    }

    match m.kind {
        message::Kind::Text => m.content.clone().unwrap_or_default(),
        message::Kind::Image => "📷 Photo".to_owned(),
        message::Kind::Audio => "🎤 Message vocal".to_owned(),
        message::Kind::File => "📎 Fichier".to_owned(),
    }
}

/// Renders `then` relative to `now` the way the conversation list shows it.
pub fn relative_time(then: NaiveDateTime, now: NaiveDateTime) -> String {
    let elapsed = now.signed_duration_since(then);

    if elapsed < TimeDelta::minutes(1) {
        "À l'instant".to_owned()
    } else if elapsed < TimeDelta::hours(1) {
        format!("Il y a {} min", elapsed.num_minutes())
    } else if elapsed < TimeDelta::days(1) {
        format!("Il y a {} h", elapsed.num_hours())
    } else if elapsed < TimeDelta::days(2) {
        "Hier".to_owned()
    } else if elapsed < TimeDelta::days(7) {
        format!("Il y a {} j", elapsed.num_days())
    } else {
        then.format("%d/%m/%Y").to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Opened {
    pub conversation_id: Id,
    pub existing: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub conversation_id: Id,
}
