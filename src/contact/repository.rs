use diesel::BoolExpressionMethods;
use diesel::ExpressionMethods;
use diesel::QueryDsl;
use diesel::RunQueryDsl;
use diesel::dsl::{exists, select};

use crate::integration::db::Pool;
use crate::schema::{blocks, friendships};
use crate::user;

const ACCEPTED: &str = "accepted";

/// Read side of the social graph. Friend requests and blocks are managed
/// elsewhere; this service only asks questions about them.
pub trait ContactRepository {
    fn are_friends(&self, a: &user::Id, b: &user::Id) -> super::Result<bool>;

    fn has_blocked(&self, blocker: &user::Id, blocked: &user::Id) -> super::Result<bool>;
}

pub struct PgContactRepository {
    pool: Pool,
}

impl PgContactRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl ContactRepository for PgContactRepository {
    fn are_friends(&self, a: &user::Id, b: &user::Id) -> super::Result<bool> {
        let mut conn = self.pool.get()?;

        let forward = friendships::requester_id
            .eq(a.get())
            .and(friendships::addressee_id.eq(b.get()));
        let backward = friendships::requester_id
            .eq(b.get())
            .and(friendships::addressee_id.eq(a.get()));

        let found = select(exists(
            friendships::table
                .filter(forward.or(backward))
                .filter(friendships::status.eq(ACCEPTED)),
        ))
        .get_result::<bool>(&mut conn)?;

        Ok(found)
    }

    fn has_blocked(&self, blocker: &user::Id, blocked: &user::Id) -> super::Result<bool> {
        let mut conn = self.pool.get()?;

        let found = select(exists(
            blocks::table
                .filter(blocks::blocker_id.eq(blocker.get()))
                .filter(blocks::blocked_id.eq(blocked.get())),
        ))
        .get_result::<bool>(&mut conn)?;

        Ok(found)
    }
}
