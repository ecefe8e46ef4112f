use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use log::debug;

use crate::event::{Broadcaster, Event};
use crate::{contact, media, message, user};

use super::model::{
    Conversation, Created, Departure, NewConversation, Opened, Participant, Preview, Summary,
};
use super::{Id, Repository, generated_avatar_url};

const UNKNOWN_USER: &str = "Utilisateur inconnu";

#[async_trait]
pub trait ConversationService {
    /// Every conversation of `user`, most recently active first.
    async fn find_all(&self, user: &user::Id) -> super::Result<Vec<Summary>>;

    /// Returns the direct conversation between `actor` and `other`,
    /// creating it on first contact.
    async fn open_private(&self, actor: &user::Id, other: Option<user::Id>)
    -> super::Result<Opened>;

    async fn create_group(
        &self,
        actor: &user::Id,
        title: Option<String>,
        members: &[user::Id],
    ) -> super::Result<Created>;

    async fn add_member(&self, id: &Id, actor: &user::Id, target: &user::Id) -> super::Result<()>;

    async fn remove_member(
        &self,
        id: &Id,
        actor: &user::Id,
        target: &user::Id,
    ) -> super::Result<Departure>;

    async fn leave(&self, id: &Id, actor: &user::Id) -> super::Result<Departure>;

    async fn update_avatar(
        &self,
        id: &Id,
        actor: &user::Id,
        upload: &media::Upload,
    ) -> super::Result<String>;

    async fn remove_avatar(&self, id: &Id, actor: &user::Id) -> super::Result<()>;
}

#[derive(Clone)]
pub struct ConversationServiceImpl {
    repo: Repository,
    message_repo: message::Repository,
    user_repo: user::Repository,
    contact_service: contact::Service,
    media_store: media::Store,
    broadcaster: Broadcaster,
}

impl ConversationServiceImpl {
    pub fn new(
        repo: Repository,
        message_repo: message::Repository,
        user_repo: user::Repository,
        contact_service: contact::Service,
        media_store: media::Store,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            repo,
            message_repo,
            user_repo,
            contact_service,
            media_store,
            broadcaster,
        }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn find_all(&self, user: &user::Id) -> super::Result<Vec<Summary>> {
        let now = Utc::now().naive_utc();
        let conversations = self.repo.find_by_member(user)?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for c in conversations {
            summaries.push(self.summarize(c, user, now)?);
        }
        Ok(summaries)
    }

    async fn open_private(
        &self,
        actor: &user::Id,
        other: Option<user::Id>,
    ) -> super::Result<Opened> {
        let other = other.ok_or(super::Error::MissingTarget)?;
        if other == *actor {
            return Err(super::Error::SelfReference);
        }
        self.ensure_exists(&other)?;

        if let Some(c) = self.repo.find_direct(actor, &other)? {
            return Ok(Opened {
                conversation_id: c.id,
                existing: true,
            });
        }

        match self.repo.create(&NewConversation::direct(*actor, other)) {
            Ok(c) => {
                debug!("direct conversation {} opened by {actor} with {other}", c.id);
                self.notify_new(&c.id, &other).await;
                Ok(Opened {
                    conversation_id: c.id,
                    existing: false,
                })
            }
            // lost the race against the other side opening it concurrently
            Err(super::Error::AlreadyExists) => {
                let c = self
                    .repo
                    .find_direct(actor, &other)?
                    .ok_or(super::Error::AlreadyExists)?;
                Ok(Opened {
                    conversation_id: c.id,
                    existing: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn create_group(
        &self,
        actor: &user::Id,
        title: Option<String>,
        members: &[user::Id],
    ) -> super::Result<Created> {
        let title = title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        let new = NewConversation::group(*actor, title, members);

        let invited = &new.members[1..];
        if invited.is_empty() {
            return Err(super::Error::NotEnoughMembers);
        }
        for target in invited {
            self.ensure_exists(target)?;
            self.contact_service.check_can_invite(actor, target).await?;
        }

        let c = self.repo.create(&new)?;
        debug!("group {} created by {actor} with {} members", c.id, new.members.len());

        for target in invited {
            self.notify_new(&c.id, target).await;
        }

        Ok(Created {
            conversation_id: c.id,
        })
    }

    async fn add_member(&self, id: &Id, actor: &user::Id, target: &user::Id) -> super::Result<()> {
        let c = self.find_group(id)?;
        self.check_participant(&c.id, actor)?;
        self.ensure_exists(target)?;
        self.contact_service.check_can_invite(actor, target).await?;

        self.repo.add_participant(id, target)?;
        self.notify_new(id, target).await;
        Ok(())
    }

    async fn remove_member(
        &self,
        id: &Id,
        actor: &user::Id,
        target: &user::Id,
    ) -> super::Result<Departure> {
        if target == actor {
            return self.leave(id, actor).await;
        }

        let c = self.find_group(id)?;
        self.check_participant(id, actor)?;
        if c.creator != *actor {
            return Err(super::Error::NotCreator);
        }

        let departure = self.repo.remove_participant(id, target)?;
        self.broadcaster
            .emit_to_user(target, &Event::RemovedFromGroup { conversation_id: *id })
            .await;

        Ok(departure)
    }

    async fn leave(&self, id: &Id, actor: &user::Id) -> super::Result<Departure> {
        self.find_group(id)?;
        self.check_participant(id, actor)?;

        let departure = self.repo.remove_participant(id, actor)?;
        debug!("{actor} left group {id}: {departure:?}");
        Ok(departure)
    }

    async fn update_avatar(
        &self,
        id: &Id,
        actor: &user::Id,
        upload: &media::Upload,
    ) -> super::Result<String> {
        self.check_creator(id, actor)?;
        if upload.kind() != message::Kind::Image {
            return Err(media::Error::NotAnImage(upload.content_type().to_owned()).into());
        }

        let media_ref = self.media_store.store(upload).await?;
        self.repo.set_avatar(id, Some(&media_ref))?;
        Ok(media_ref)
    }

    async fn remove_avatar(&self, id: &Id, actor: &user::Id) -> super::Result<()> {
        self.check_creator(id, actor)?;
        self.repo.set_avatar(id, None)
    }
}

impl ConversationServiceImpl {
    fn summarize(
        &self,
        c: Conversation,
        viewer: &user::Id,
        now: NaiveDateTime,
    ) -> super::Result<Summary> {
        let participants = self.repo.find_participants(&c.id)?;
        let last_read_at = participants
            .iter()
            .find(|p| p.user_id == *viewer)
            .and_then(|p| p.last_read_at);
        let others = other_members(&participants, viewer);

        let (name, avatar, other_user_id) = if c.is_direct() {
            let other = others.first().copied();
            let info = match other {
                Some(o) => self.user_repo.find_by_ids(&[o])?.into_iter().next(),
                None => None,
            };
            match info {
                Some(u) => (u.name, u.avatar, Some(u.id)),
                None => (UNKNOWN_USER.to_owned(), None, other),
            }
        } else {
            let name = match c.title.clone() {
                Some(title) => title,
                None => self.member_names(&others)?,
            };
            let avatar = c
                .avatar
                .clone()
                .unwrap_or_else(|| generated_avatar_url(&c.id));
            (name, Some(avatar), None)
        };

        let last_message = self
            .message_repo
            .find_last(&c.id)?
            .map(|m| Preview::new(&m, now));
        let unread_count = self.message_repo.count_unread(&c.id, viewer, last_read_at)?;

        Ok(Summary {
            id: c.id,
            kind: c.kind,
            name,
            avatar,
            other_user_id,
            creator_id: c.creator,
            last_message,
            last_message_at: c.last_message_at,
            unread_count,
        })
    }

    /// Names of `members` in join order, for groups without a title.
    fn member_names(&self, members: &[user::Id]) -> super::Result<String> {
        let infos = self
            .user_repo
            .find_by_ids(members)?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect::<HashMap<_, _>>();

        let names = members
            .iter()
            .filter_map(|m| infos.get(m).cloned())
            .collect::<Vec<_>>();
        Ok(names.join(", "))
    }

    fn ensure_exists(&self, user: &user::Id) -> super::Result<()> {
        match self.user_repo.find_by_id(user) {
            Ok(_) => Ok(()),
            Err(user::Error::NotFound(id)) => Err(super::Error::NonExistingUser(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn find_group(&self, id: &Id) -> super::Result<Conversation> {
        let c = self.repo.find_by_id(id)?;
        if c.is_direct() {
            return Err(super::Error::NotGroup);
        }
        Ok(c)
    }

    fn check_participant(&self, id: &Id, user: &user::Id) -> super::Result<()> {
        match self.repo.find_participant(id, user)? {
            Some(_) => Ok(()),
            None => Err(super::Error::NotMember),
        }
    }

    fn check_creator(&self, id: &Id, actor: &user::Id) -> super::Result<()> {
        let c = self.find_group(id)?;
        self.check_participant(id, actor)?;
        if c.creator != *actor {
            return Err(super::Error::NotCreator);
        }
        Ok(())
    }

    async fn notify_new(&self, id: &Id, recipient: &user::Id) {
        self.broadcaster
            .emit_to_user(
                recipient,
                &Event::NewConversation {
                    recipient_id: *recipient,
                    conversation_id: *id,
                },
            )
            .await;
    }
}

fn other_members(participants: &[Participant], viewer: &user::Id) -> Vec<user::Id> {
    participants
        .iter()
        .map(|p| p.user_id)
        .filter(|u| u != viewer)
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::contact::service::ContactServiceImpl;
    use crate::conversation::{self, Kind};
    use crate::message::model::Draft;
    use crate::message::service::{MessageService, MessageServiceImpl};
    use crate::testing::{MemoryStore, RecordingTransport};

    use super::*;

    struct Fixture {
        store: MemoryStore,
        transport: RecordingTransport,
        service: ConversationServiceImpl,
        messages: MessageServiceImpl,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let transport = RecordingTransport::default();
        let repo: conversation::Repository = Arc::new(store.clone());
        let broadcaster = Broadcaster::new(Arc::new(transport.clone()), repo.clone());
        let contact_service: contact::Service =
            Arc::new(ContactServiceImpl::new(Arc::new(store.clone())));

        let service = ConversationServiceImpl::new(
            repo.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            contact_service.clone(),
            Arc::new(store.clone()),
            broadcaster.clone(),
        );
        let messages = MessageServiceImpl::new(
            Arc::new(store.clone()),
            repo,
            Arc::new(store.clone()),
            contact_service,
            broadcaster,
        );

        Fixture {
            store,
            transport,
            service,
            messages,
        }
    }

    #[tokio::test]
    async fn should_reuse_direct_conversation_in_both_directions() {
        let f = fixture();
        let (a, b) = (f.store.add_user("Amélie Roux"), f.store.add_user("Bastien Morel"));

        let first = f.service.open_private(&a, Some(b)).await.unwrap();
        let second = f.service.open_private(&b, Some(a)).await.unwrap();

        assert!(!first.existing);
        assert!(second.existing);
        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(f.transport.events_for(&b).len(), 1);
    }

    #[tokio::test]
    async fn should_refuse_private_conversation_with_self_or_nobody() {
        let f = fixture();
        let a = f.store.add_user("Amélie Roux");

        assert!(matches!(
            f.service.open_private(&a, Some(a)).await,
            Err(super::super::Error::SelfReference)
        ));
        assert!(matches!(
            f.service.open_private(&a, None).await,
            Err(super::super::Error::MissingTarget)
        ));
        assert!(matches!(
            f.service.open_private(&a, Some(user::Id::random())).await,
            Err(super::super::Error::NonExistingUser(_))
        ));
    }

    #[tokio::test]
    async fn should_name_direct_conversation_after_other_participant() {
        let f = fixture();
        let (a, b) = (f.store.add_user("Amélie Roux"), f.store.add_user("Bastien Morel"));
        f.service.open_private(&a, Some(b)).await.unwrap();

        let list = f.service.find_all(&a).await.unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, Kind::Direct);
        assert_eq!(list[0].name, "Bastien Morel");
        assert_eq!(list[0].other_user_id, Some(b));
        assert_eq!(list[0].last_message, None);
        assert_eq!(list[0].unread_count, 0);
    }

    #[tokio::test]
    async fn should_order_by_last_activity_and_count_unread() {
        let f = fixture();
        let (a, b, c) = (
            f.store.add_user("Amélie Roux"),
            f.store.add_user("Bastien Morel"),
            f.store.add_user("Chloé Petit"),
        );
        let with_b = f.service.open_private(&a, Some(b)).await.unwrap().conversation_id;
        let with_c = f.service.open_private(&a, Some(c)).await.unwrap().conversation_id;

        f.messages.send(&with_b, &b, Draft::text("coucou")).await.unwrap();
        f.messages.send(&with_b, &b, Draft::text("tu es là ?")).await.unwrap();

        let list = f.service.find_all(&a).await.unwrap();
        assert_eq!(list[0].id, with_b);
        assert_eq!(list[1].id, with_c);
        assert_eq!(list[0].unread_count, 2);
        assert_eq!(list[0].last_message.as_ref().unwrap().text, "tu es là ?");

        f.messages.fetch(&with_b, &a).await.unwrap();
        let list = f.service.find_all(&a).await.unwrap();
        assert_eq!(list[0].unread_count, 0);

        let list = f.service.find_all(&b).await.unwrap();
        assert_eq!(list[0].unread_count, 0);
    }

    #[tokio::test]
    async fn should_create_group_with_friends_only() {
        let f = fixture();
        let (a, b, c) = (
            f.store.add_user("Amélie Roux"),
            f.store.add_user("Bastien Morel"),
            f.store.add_user("Chloé Petit"),
        );
        f.store.befriend(&a, &b);

        let res = f.service.create_group(&a, None, &[b, c]).await;
        assert!(matches!(
            res,
            Err(super::super::Error::_Contact(contact::Error::NotFriends(id))) if id == c
        ));

        f.store.befriend(&a, &c);
        let created = f.service.create_group(&a, None, &[b, c]).await.unwrap();

        let list = f.service.find_all(&a).await.unwrap();
        assert_eq!(list[0].id, created.conversation_id);
        assert_eq!(list[0].name, "Bastien Morel, Chloé Petit");
        assert_eq!(
            list[0].avatar,
            Some(generated_avatar_url(&created.conversation_id))
        );
        assert_eq!(f.transport.events_for(&b).len(), 1);
        assert_eq!(f.transport.events_for(&c).len(), 1);
    }

    #[tokio::test]
    async fn should_refuse_group_without_other_members() {
        let f = fixture();
        let a = f.store.add_user("Amélie Roux");

        let res = f.service.create_group(&a, Some("Solo".into()), &[a]).await;

        assert!(matches!(res, Err(super::super::Error::NotEnoughMembers)));
    }

    #[tokio::test]
    async fn should_refuse_adding_blocked_friend() {
        let f = fixture();
        let (a, b, c) = (
            f.store.add_user("Amélie Roux"),
            f.store.add_user("Bastien Morel"),
            f.store.add_user("Chloé Petit"),
        );
        f.store.befriend(&a, &b);
        f.store.befriend(&a, &c);
        f.store.block(&a, &c);
        let group = f
            .service
            .create_group(&a, Some("Voisins".into()), &[b])
            .await
            .unwrap()
            .conversation_id;

        let res = f.service.add_member(&group, &a, &c).await;

        assert!(matches!(
            res,
            Err(super::super::Error::_Contact(contact::Error::TargetBlocked(_)))
        ));
    }

    #[tokio::test]
    async fn should_let_only_creator_remove_members() {
        let f = fixture();
        let (a, b, c) = (
            f.store.add_user("Amélie Roux"),
            f.store.add_user("Bastien Morel"),
            f.store.add_user("Chloé Petit"),
        );
        f.store.befriend(&a, &b);
        f.store.befriend(&a, &c);
        let group = f
            .service
            .create_group(&a, Some("Voisins".into()), &[b, c])
            .await
            .unwrap()
            .conversation_id;

        assert!(matches!(
            f.service.remove_member(&group, &b, &c).await,
            Err(super::super::Error::NotCreator)
        ));

        let departure = f.service.remove_member(&group, &a, &c).await.unwrap();
        assert_eq!(departure, Departure::Left { new_creator: None });
        assert!(
            f.transport
                .events_for(&c)
                .contains(&Event::RemovedFromGroup { conversation_id: group })
        );
        assert!(f.service.find_all(&c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_hand_creator_role_over_and_dissolve_empty_group() {
        let f = fixture();
        let (a, b) = (f.store.add_user("Amélie Roux"), f.store.add_user("Bastien Morel"));
        f.store.befriend(&a, &b);
        let group = f
            .service
            .create_group(&a, Some("Duo".into()), &[b])
            .await
            .unwrap()
            .conversation_id;
        f.messages.send(&group, &a, Draft::text("bienvenue")).await.unwrap();

        let departure = f.service.leave(&group, &a).await.unwrap();
        assert_eq!(departure, Departure::Left { new_creator: Some(b) });
        assert_eq!(f.service.find_all(&b).await.unwrap()[0].creator_id, b);

        let departure = f.service.leave(&group, &b).await.unwrap();
        assert_eq!(departure, Departure::Dissolved);
        assert!(f.store.messages_of(&group).is_empty());
    }

    #[tokio::test]
    async fn should_refuse_leaving_direct_conversation() {
        let f = fixture();
        let (a, b) = (f.store.add_user("Amélie Roux"), f.store.add_user("Bastien Morel"));
        let id = f.service.open_private(&a, Some(b)).await.unwrap().conversation_id;

        assert!(matches!(
            f.service.leave(&id, &a).await,
            Err(super::super::Error::NotGroup)
        ));
    }

    #[tokio::test]
    async fn should_let_only_creator_change_avatar() {
        let f = fixture();
        let (a, b) = (f.store.add_user("Amélie Roux"), f.store.add_user("Bastien Morel"));
        f.store.befriend(&a, &b);
        let group = f
            .service
            .create_group(&a, Some("Duo".into()), &[b])
            .await
            .unwrap()
            .conversation_id;
        let upload = media::Upload::new(Some("chat.png".into()), "image/png", vec![1, 2, 3]);

        assert!(matches!(
            f.service.update_avatar(&group, &b, &upload).await,
            Err(super::super::Error::NotCreator)
        ));

        let avatar = f.service.update_avatar(&group, &a, &upload).await.unwrap();
        assert_eq!(f.service.find_all(&b).await.unwrap()[0].avatar, Some(avatar));

        f.service.remove_avatar(&group, &a).await.unwrap();
        assert_eq!(
            f.service.find_all(&b).await.unwrap()[0].avatar,
            Some(generated_avatar_url(&group))
        );
    }
}
