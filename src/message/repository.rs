use chrono::NaiveDateTime;
use diesel::BoolExpressionMethods;
use diesel::Connection;
use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::QueryDsl;
use diesel::RunQueryDsl;
use diesel::SelectableHelper;

use crate::integration::db::Pool;
use crate::schema::{conversations, messages, participants};
use crate::{conversation, user};

use super::Id;
use super::model::{Message, MessageRow, NewMessage, NewMessageRow};

pub trait MessageRepository {
    /// Persists `m` and, in the same transaction, advances the
    /// conversation's last activity and the sender's read pointer to the
    /// message's creation time.
    fn append(&self, m: &NewMessage) -> super::Result<Message>;

    fn find_by_id(&self, id: &Id) -> super::Result<Message>;

    /// Ordered by creation, oldest first.
    fn find_by_conversation(&self, id: &conversation::Id) -> super::Result<Vec<Message>>;

    fn find_last(&self, id: &conversation::Id) -> super::Result<Option<Message>>;

    fn count_unread(
        &self,
        id: &conversation::Id,
        viewer: &user::Id,
        last_read_at: Option<NaiveDateTime>,
    ) -> super::Result<i64>;

    fn soft_delete(&self, id: &Id) -> super::Result<()>;
}

pub struct PgMessageRepository {
    pool: Pool,
}

impl PgMessageRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl MessageRepository for PgMessageRepository {
    fn append(&self, m: &NewMessage) -> super::Result<Message> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, super::Error, _>(|conn| {
            let row = diesel::insert_into(messages::table)
                .values(&NewMessageRow::from(m))
                .returning(MessageRow::as_returning())
                .get_result(conn)?;
            let message = Message::try_from(row)?;

            diesel::update(conversations::table.find(m.conversation_id.get()))
                .set(conversations::last_message_at.eq(message.created_at))
                .execute(conn)?;

            diesel::update(
                participants::table
                    .filter(participants::conversation_id.eq(m.conversation_id.get()))
                    .filter(participants::user_id.eq(m.sender.get()))
                    .filter(
                        participants::last_read_at
                            .is_null()
                            .or(participants::last_read_at.lt(message.created_at)),
                    ),
            )
            .set(participants::last_read_at.eq(message.created_at))
            .execute(conn)?;

            Ok(message)
        })
    }

    fn find_by_id(&self, id: &Id) -> super::Result<Message> {
        let mut conn = self.pool.get()?;

        let row = messages::table
            .find(id.get())
            .select(MessageRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.ok_or(super::Error::NotFound(*id))?.try_into()
    }

    fn find_by_conversation(&self, id: &conversation::Id) -> super::Result<Vec<Message>> {
        let mut conn = self.pool.get()?;

        let rows = messages::table
            .filter(messages::conversation_id.eq(id.get()))
            .order(messages::seq.asc())
            .select(MessageRow::as_select())
            .load(&mut conn)?;

        rows.into_iter().map(Message::try_from).collect()
    }

    fn find_last(&self, id: &conversation::Id) -> super::Result<Option<Message>> {
        let mut conn = self.pool.get()?;

        let row = messages::table
            .filter(messages::conversation_id.eq(id.get()))
            .order(messages::seq.desc())
            .select(MessageRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(Message::try_from).transpose()
    }

    fn count_unread(
        &self,
        id: &conversation::Id,
        viewer: &user::Id,
        last_read_at: Option<NaiveDateTime>,
    ) -> super::Result<i64> {
        let mut conn = self.pool.get()?;

        let mut query = messages::table
            .filter(messages::conversation_id.eq(id.get()))
            .filter(messages::sender_id.ne(viewer.get()))
            .filter(messages::is_deleted.eq(false))
            .into_boxed();

        if let Some(read) = last_read_at {
            query = query.filter(messages::created_at.gt(read));
        }

        let count = query.count().get_result(&mut conn)?;
        Ok(count)
    }

    fn soft_delete(&self, id: &Id) -> super::Result<()> {
        let mut conn = self.pool.get()?;

        let updated = diesel::update(messages::table.find(id.get()))
            .set(messages::is_deleted.eq(true))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(super::Error::NotFound(*id));
        }
        Ok(())
    }
}
