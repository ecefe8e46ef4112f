use diesel::prelude::{Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Id;

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    id: Uuid,
    first_name: String,
    last_name: String,
    avatar: Option<String>,
}

/// Display fields of a user as rendered next to messages and conversations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Id,
    pub name: String,
    pub avatar: Option<String>,
}

impl UserInfo {
    pub fn new(id: Id, name: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar,
        }
    }
}

impl From<User> for UserInfo {
    fn from(u: User) -> Self {
        let name = format!("{} {}", u.first_name, u.last_name).trim().to_owned();
        Self::new(Id::from(u.id), name, u.avatar)
    }
}
