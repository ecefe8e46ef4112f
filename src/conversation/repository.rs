use diesel::BoolExpressionMethods;
use diesel::Connection;
use diesel::ExpressionMethods;
use diesel::NullableExpressionMethods;
use diesel::OptionalExtension;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::RunQueryDsl;
use diesel::SelectableHelper;
use diesel::dsl::now;
use diesel::result::DatabaseErrorKind;

use crate::integration::db::Pool;
use crate::schema::{conversations, messages, participants};
use crate::user;

use super::Id;
use super::model::{
    Conversation, ConversationRow, Departure, NewConversation, NewConversationRow,
    NewParticipantRow, Participant, ParticipantRow, direct_key,
};

pub trait ConversationRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<Conversation>;

    fn find_direct(&self, a: &user::Id, b: &user::Id) -> super::Result<Option<Conversation>>;

    /// Ordered by last activity, most recent first.
    fn find_by_member(&self, user: &user::Id) -> super::Result<Vec<Conversation>>;

    /// Inserts the conversation and all of its members at once.
    fn create(&self, c: &NewConversation) -> super::Result<Conversation>;

    /// Ordered by join time, oldest first.
    fn find_participants(&self, id: &Id) -> super::Result<Vec<Participant>>;

    fn find_participant(&self, id: &Id, user: &user::Id) -> super::Result<Option<Participant>>;

    fn add_participant(&self, id: &Id, user: &user::Id) -> super::Result<()>;

    /// Removes `user` from the group. Dissolves the conversation when nobody
    /// is left, otherwise hands the creator role over when `user` held it.
    fn remove_participant(&self, id: &Id, user: &user::Id) -> super::Result<Departure>;

    fn set_avatar(&self, id: &Id, avatar: Option<&str>) -> super::Result<()>;

    /// Moves the read pointer of `user` to the store's current time. Never
    /// moves it backwards.
    fn mark_read(&self, id: &Id, user: &user::Id) -> super::Result<()>;
}

pub struct PgConversationRepository {
    pool: Pool,
}

impl PgConversationRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl ConversationRepository for PgConversationRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<Conversation> {
        let mut conn = self.pool.get()?;

        let row = conversations::table
            .find(id.get())
            .select(ConversationRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.ok_or(super::Error::NotFound(*id))?.try_into()
    }

    fn find_direct(&self, a: &user::Id, b: &user::Id) -> super::Result<Option<Conversation>> {
        let mut conn = self.pool.get()?;

        let row = conversations::table
            .filter(conversations::direct_key.eq(direct_key(a, b)))
            .select(ConversationRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(Conversation::try_from).transpose()
    }

    fn find_by_member(&self, user: &user::Id) -> super::Result<Vec<Conversation>> {
        let mut conn = self.pool.get()?;

        let rows = conversations::table
            .inner_join(participants::table)
            .filter(participants::user_id.eq(user.get()))
            .order(conversations::last_message_at.desc())
            .select(ConversationRow::as_select())
            .load(&mut conn)?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    fn create(&self, c: &NewConversation) -> super::Result<Conversation> {
        let mut conn = self.pool.get()?;

        let res = conn.transaction::<_, super::Error, _>(|conn| {
            let row = NewConversationRow::from(c);
            let id = Id::from(*row.id());

            let created = diesel::insert_into(conversations::table)
                .values(&row)
                .returning(ConversationRow::as_returning())
                .get_result(conn)?;

            let members = c
                .members
                .iter()
                .map(|m| NewParticipantRow::new(&id, m))
                .collect::<Vec<_>>();
            diesel::insert_into(participants::table)
                .values(&members)
                .execute(conn)?;

            created.try_into()
        });

        match res {
            Err(super::Error::_Diesel(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => Err(super::Error::AlreadyExists),
            other => other,
        }
    }

    fn find_participants(&self, id: &Id) -> super::Result<Vec<Participant>> {
        let mut conn = self.pool.get()?;

        let rows = participants::table
            .filter(participants::conversation_id.eq(id.get()))
            .order(participants::joined_at.asc())
            .select(ParticipantRow::as_select())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(Participant::from).collect())
    }

    fn find_participant(&self, id: &Id, user: &user::Id) -> super::Result<Option<Participant>> {
        let mut conn = self.pool.get()?;

        let row = participants::table
            .filter(participants::conversation_id.eq(id.get()))
            .filter(participants::user_id.eq(user.get()))
            .select(ParticipantRow::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row.map(Participant::from))
    }

    fn add_participant(&self, id: &Id, user: &user::Id) -> super::Result<()> {
        let mut conn = self.pool.get()?;

        let res = diesel::insert_into(participants::table)
            .values(&NewParticipantRow::new(id, user))
            .execute(&mut conn);

        match res {
            Ok(_) => Ok(()),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(super::Error::AlreadyMember(*user))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove_participant(&self, id: &Id, user: &user::Id) -> super::Result<Departure> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, super::Error, _>(|conn| remove_participant_tx(conn, id, user))
    }

    fn set_avatar(&self, id: &Id, avatar: Option<&str>) -> super::Result<()> {
        let mut conn = self.pool.get()?;

        let updated = diesel::update(conversations::table.find(id.get()))
            .set(conversations::avatar.eq(avatar))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(super::Error::NotFound(*id));
        }
        Ok(())
    }

    fn mark_read(&self, id: &Id, user: &user::Id) -> super::Result<()> {
        let mut conn = self.pool.get()?;

        diesel::update(
            participants::table
                .filter(participants::conversation_id.eq(id.get()))
                .filter(participants::user_id.eq(user.get()))
                .filter(
                    participants::last_read_at
                        .is_null()
                        .or(participants::last_read_at.lt(now.nullable())),
                ),
        )
        .set(participants::last_read_at.eq(now.nullable()))
        .execute(&mut conn)?;

        Ok(())
    }
}

fn remove_participant_tx(
    conn: &mut PgConnection,
    id: &Id,
    user: &user::Id,
) -> super::Result<Departure> {
    let conversation: Conversation = conversations::table
        .find(id.get())
        .select(ConversationRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(super::Error::NotFound(*id))?
        .try_into()?;

    let removed = diesel::delete(
        participants::table
            .filter(participants::conversation_id.eq(id.get()))
            .filter(participants::user_id.eq(user.get())),
    )
    .execute(conn)?;
    if removed == 0 {
        return Err(super::Error::MemberNotFound(*user));
    }

    let successor = participants::table
        .filter(participants::conversation_id.eq(id.get()))
        .order(participants::joined_at.asc())
        .select(participants::user_id)
        .first::<uuid::Uuid>(conn)
        .optional()?;

    let Some(successor) = successor else {
        diesel::delete(messages::table.filter(messages::conversation_id.eq(id.get())))
            .execute(conn)?;
        diesel::delete(conversations::table.find(id.get())).execute(conn)?;
        return Ok(Departure::Dissolved);
    };

    if conversation.creator != *user {
        return Ok(Departure::Left { new_creator: None });
    }

    diesel::update(conversations::table.find(id.get()))
        .set(conversations::creator_id.eq(successor))
        .execute(conn)?;

    Ok(Departure::Left {
        new_creator: Some(user::Id::from(successor)),
    })
}
