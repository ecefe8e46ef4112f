use async_trait::async_trait;

use crate::user;

use super::{BlockStatus, Repository};

#[async_trait]
pub trait ContactService {
    /// Block status of the pair from `me`'s point of view. When both sides
    /// blocked each other, `IBlocked` wins since it is the one `me` can lift.
    async fn block_status(
        &self,
        me: &user::Id,
        other: &user::Id,
    ) -> super::Result<Option<BlockStatus>>;

    /// Checks that `actor` may pull `target` into a group conversation.
    async fn check_can_invite(&self, actor: &user::Id, target: &user::Id) -> super::Result<()>;
}

#[derive(Clone)]
pub struct ContactServiceImpl {
    repo: Repository,
}

impl ContactServiceImpl {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ContactService for ContactServiceImpl {
    async fn block_status(
        &self,
        me: &user::Id,
        other: &user::Id,
    ) -> super::Result<Option<BlockStatus>> {
        if self.repo.has_blocked(me, other)? {
            return Ok(Some(BlockStatus::IBlocked));
        }
        if self.repo.has_blocked(other, me)? {
            return Ok(Some(BlockStatus::TheyBlocked));
        }
        Ok(None)
    }

    async fn check_can_invite(&self, actor: &user::Id, target: &user::Id) -> super::Result<()> {
        if !self.repo.are_friends(actor, target)? {
            return Err(super::Error::NotFriends(*target));
        }
        if self.repo.has_blocked(actor, target)? {
            return Err(super::Error::TargetBlocked(*target));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::testing::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn should_report_block_direction_for_both_sides() {
        let store = MemoryStore::new();
        let (a, b) = (store.add_user("Amélie"), store.add_user("Bastien"));
        store.block(&a, &b);
        let service = ContactServiceImpl::new(Arc::new(store));

        assert_eq!(
            service.block_status(&a, &b).await.unwrap(),
            Some(BlockStatus::IBlocked)
        );
        assert_eq!(
            service.block_status(&b, &a).await.unwrap(),
            Some(BlockStatus::TheyBlocked)
        );
    }

    #[tokio::test]
    async fn should_prefer_own_block_when_mutual() {
        let store = MemoryStore::new();
        let (a, b) = (store.add_user("Amélie"), store.add_user("Bastien"));
        store.block(&a, &b);
        store.block(&b, &a);
        let service = ContactServiceImpl::new(Arc::new(store));

        assert_eq!(
            service.block_status(&b, &a).await.unwrap(),
            Some(BlockStatus::IBlocked)
        );
    }

    #[tokio::test]
    async fn should_refuse_invite_of_non_friend() {
        let store = MemoryStore::new();
        let (a, b) = (store.add_user("Amélie"), store.add_user("Bastien"));
        let service = ContactServiceImpl::new(Arc::new(store));

        let res = service.check_can_invite(&a, &b).await;

        assert!(matches!(res, Err(super::super::Error::NotFriends(id)) if id == b));
    }

    #[tokio::test]
    async fn should_refuse_invite_of_blocked_friend() {
        let store = MemoryStore::new();
        let (a, b) = (store.add_user("Amélie"), store.add_user("Bastien"));
        store.befriend(&a, &b);
        store.block(&a, &b);
        let service = ContactServiceImpl::new(Arc::new(store));

        let res = service.check_can_invite(&a, &b).await;

        assert!(matches!(res, Err(super::super::Error::TargetBlocked(id)) if id == b));
    }

    #[tokio::test]
    async fn should_allow_invite_of_friend_who_blocked_actor() {
        let store = MemoryStore::new();
        let (a, b) = (store.add_user("Amélie"), store.add_user("Bastien"));
        store.befriend(&a, &b);
        store.block(&b, &a);
        let service = ContactServiceImpl::new(Arc::new(store));

        assert!(service.check_can_invite(&a, &b).await.is_ok());
    }
}
