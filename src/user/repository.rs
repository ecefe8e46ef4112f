use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::QueryDsl;
use diesel::RunQueryDsl;
use diesel::SelectableHelper;

use crate::integration::db::Pool;
use crate::schema::users;

use super::Id;
use super::model::{User, UserInfo};

pub trait UserRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<UserInfo>;

    fn find_by_ids(&self, ids: &[Id]) -> super::Result<Vec<UserInfo>>;
}

pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl UserRepository for PgUserRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<UserInfo> {
        let mut conn = self.pool.get()?;

        let u = users::table
            .find(id.get())
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;

        u.map(UserInfo::from).ok_or(super::Error::NotFound(*id))
    }

    fn find_by_ids(&self, ids: &[Id]) -> super::Result<Vec<UserInfo>> {
        let mut conn = self.pool.get()?;

        let uuids = ids.iter().map(|id| *id.get()).collect::<Vec<_>>();
        let users = users::table
            .filter(users::id.eq_any(uuids))
            .select(User::as_select())
            .load(&mut conn)?;

        Ok(users.into_iter().map(UserInfo::from).collect())
    }
}
