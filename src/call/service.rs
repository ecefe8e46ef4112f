use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::event::{Broadcaster, Event};
use crate::{conversation, user};

use super::registry::{CallRegistry, Departure, OfferOutcome, Transition};
use super::replica::Update;
use super::{
    CallKind, CallerInfo, Config, EndReason, FailReason, IceCandidate, MAX_PARTICIPANTS,
    Replicator, SessionDescription,
};

/// Relays call signaling between the participants of a conversation and
/// keeps one call per conversation.
#[async_trait]
pub trait CallService {
    async fn call_user(&self, from: &user::Id, offer: Offer);

    async fn answer(
        &self,
        from: &user::Id,
        conversation_id: &conversation::Id,
        to: &user::Id,
        answer: SessionDescription,
    );

    async fn ice_candidate(
        &self,
        from: &user::Id,
        conversation_id: &conversation::Id,
        to: &user::Id,
        candidate: IceCandidate,
    );

    async fn end(&self, from: &user::Id, conversation_id: &conversation::Id);

    async fn decline(&self, from: &user::Id, conversation_id: &conversation::Id);

    /// Called once the last realtime connection of `user` is gone.
    async fn disconnect(&self, user: &user::Id);
}

#[derive(Clone, Debug)]
pub struct Offer {
    pub conversation_id: conversation::Id,
    pub to: user::Id,
    pub offer: SessionDescription,
    pub call_type: CallKind,
    pub caller: CallerInfo,
    pub participants: Vec<user::Id>,
}

/// Every instance keeps a replica of the call registry. Transitions made
/// here are published through `replicator`, the ones made elsewhere come
/// back through [`CallServiceImpl::replay`].
#[derive(Clone)]
pub struct CallServiceImpl {
    origin: Uuid,
    registry: Arc<Mutex<CallRegistry>>,
    conversation_repo: conversation::Repository,
    broadcaster: Broadcaster,
    replicator: Replicator,
    config: Config,
}

impl CallServiceImpl {
    pub fn new(
        conversation_repo: conversation::Repository,
        broadcaster: Broadcaster,
        replicator: Replicator,
        config: Config,
    ) -> Self {
        Self {
            origin: Uuid::new_v4(),
            registry: Arc::new(Mutex::new(CallRegistry::default())),
            conversation_repo,
            broadcaster,
            replicator,
            config,
        }
    }

    /// Applies a transition made by another instance.
    pub async fn replay(&self, update: &Update) {
        if update.origin == self.origin {
            return;
        }
        debug!("replaying {:?}", update.transition);
        self.registry.lock().await.apply(&update.transition);
    }
}

#[async_trait]
impl CallService for CallServiceImpl {
    async fn call_user(&self, from: &user::Id, o: Offer) {
        let conversation_id = o.conversation_id;

        let members = match self.conversation_repo.find_participants(&conversation_id) {
            Ok(ps) => ps.into_iter().map(|p| p.user_id).collect::<Vec<_>>(),
            Err(e) => {
                warn!("could not load participants of {conversation_id}: {e}");
                return;
            }
        };
        if !members.contains(from) || !members.contains(&o.to) {
            warn!("{from} tried to call {} outside of {conversation_id}", o.to);
            self.fail(from, &conversation_id, FailReason::NotMember).await;
            return;
        }

        // only participants of the conversation can be invited
        let invited = o
            .participants
            .iter()
            .copied()
            .filter(|p| members.contains(p))
            .collect::<Vec<_>>();
        if invited.len() > MAX_PARTICIPANTS {
            self.fail(from, &conversation_id, FailReason::TooManyParticipants)
                .await;
            return;
        }

        let (outcome, initiator, start) = {
            let mut registry = self.registry.lock().await;
            let outcome = registry.offer(&conversation_id, from, &o.to, o.call_type, &invited);
            let initiator = registry
                .get(&conversation_id)
                .map_or(*from, |s| s.initiator);
            (outcome, initiator, registry.start_of(&conversation_id))
        };

        match outcome {
            OfferOutcome::Started { token } => {
                info!("{from} started a {:?} call in {conversation_id}", o.call_type);
                if let Some(start) = start {
                    self.replicate(start).await;
                }
                self.schedule_ring_timeout(conversation_id, token);
            }
            OfferOutcome::Relayed => {}
            OfferOutcome::Busy => {
                warn!("{from} called into busy {conversation_id}");
                self.fail(from, &conversation_id, FailReason::Busy).await;
                return;
            }
            OfferOutcome::Gone => {
                debug!("{} already left the call in {conversation_id}", o.to);
                self.broadcaster
                    .emit_to_user(
                        from,
                        &Event::CallEnded {
                            conversation_id,
                            from: Some(o.to),
                            reason: EndReason::Hangup,
                        },
                    )
                    .await;
                return;
            }
        }

        debug!("relaying offer {from} -> {} in {conversation_id}", o.to);
        self.broadcaster
            .emit_to_user(
                &o.to,
                &Event::IncomingCall {
                    conversation_id,
                    from: *from,
                    offer: o.offer,
                    call_type: o.call_type,
                    caller: o.caller,
                    initiator,
                    participants: invited,
                },
            )
            .await;
    }

    async fn answer(
        &self,
        from: &user::Id,
        conversation_id: &conversation::Id,
        to: &user::Id,
        answer: SessionDescription,
    ) {
        let known = {
            let mut registry = self.registry.lock().await;
            let known = registry.get(conversation_id).is_some();
            if known
                && (!registry.is_member(conversation_id, to)
                    || !registry.accept(conversation_id, from))
            {
                warn!("dropping answer {from} -> {to}: no such call in {conversation_id}");
                return;
            }
            known
        };
        // the call may not have reached this replica yet
        if !known && !self.both_participate(conversation_id, from, to) {
            warn!("dropping answer {from} -> {to}: not both in {conversation_id}");
            return;
        }

        self.replicate(Transition::Accept {
            conversation_id: *conversation_id,
            user: *from,
        })
        .await;

        debug!("relaying answer {from} -> {to} in {conversation_id}");
        self.broadcaster
            .emit_to_user(
                to,
                &Event::CallAccepted {
                    conversation_id: *conversation_id,
                    from: *from,
                    answer,
                },
            )
            .await;
    }

    async fn ice_candidate(
        &self,
        from: &user::Id,
        conversation_id: &conversation::Id,
        to: &user::Id,
        candidate: IceCandidate,
    ) {
        let allowed = {
            let registry = self.registry.lock().await;
            registry.get(conversation_id).map(|_| {
                registry.is_member(conversation_id, from) && registry.is_member(conversation_id, to)
            })
        };
        let allowed =
            allowed.unwrap_or_else(|| self.both_participate(conversation_id, from, to));
        if !allowed {
            debug!("dropping ICE candidate {from} -> {to}: no such call in {conversation_id}");
            return;
        }

        self.broadcaster
            .emit_to_user(
                to,
                &Event::IceCandidate {
                    conversation_id: *conversation_id,
                    from: *from,
                    candidate,
                },
            )
            .await;
    }

    async fn end(&self, from: &user::Id, conversation_id: &conversation::Id) {
        let departure = self.leave(conversation_id, from).await;
        let Some(departure) = departure else {
            debug!("{from} ended a call that is already gone in {conversation_id}");
            return;
        };

        debug!("{from} hung up in {conversation_id}, ended: {}", departure.ended);
        let event = Event::CallEnded {
            conversation_id: *conversation_id,
            from: Some(*from),
            reason: EndReason::Hangup,
        };
        self.notify(&departure.remaining, &event).await;
    }

    async fn decline(&self, from: &user::Id, conversation_id: &conversation::Id) {
        let departure = self.leave(conversation_id, from).await;
        let Some(departure) = departure else {
            debug!("{from} declined a call that is already gone in {conversation_id}");
            return;
        };

        debug!("{from} declined in {conversation_id}, ended: {}", departure.ended);
        let event = Event::CallDeclined {
            conversation_id: *conversation_id,
            from: *from,
        };
        self.notify(&departure.remaining, &event).await;
    }

    async fn disconnect(&self, user: &user::Id) {
        let departures = self.registry.lock().await.drop_user(user);

        for (conversation_id, Departure { remaining, .. }) in departures {
            info!("{user} dropped out of the call in {conversation_id}");
            self.replicate(Transition::Leave {
                conversation_id,
                user: *user,
            })
            .await;
            let event = Event::CallEnded {
                conversation_id,
                from: Some(*user),
                reason: EndReason::Disconnected,
            };
            self.notify(&remaining, &event).await;
        }
    }
}

impl CallServiceImpl {
    fn schedule_ring_timeout(&self, conversation_id: conversation::Id, token: Uuid) {
        let this = self.clone();
        let timeout = self.config.ring_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let expired = this.registry.lock().await.expire(&conversation_id, token);
            if let Some(members) = expired {
                info!("call in {conversation_id} was not answered in time");
                this.replicate(Transition::Expire {
                    conversation_id,
                    token,
                })
                .await;
                let event = Event::CallEnded {
                    conversation_id,
                    from: None,
                    reason: EndReason::Timeout,
                };
                this.notify(&members, &event).await;
            }
        });
    }

    async fn leave(
        &self,
        conversation_id: &conversation::Id,
        user: &user::Id,
    ) -> Option<Departure> {
        let departure = self.registry.lock().await.leave(conversation_id, user);
        if departure.is_some() {
            self.replicate(Transition::Leave {
                conversation_id: *conversation_id,
                user: *user,
            })
            .await;
        }
        departure
    }

    fn both_participate(
        &self,
        conversation_id: &conversation::Id,
        a: &user::Id,
        b: &user::Id,
    ) -> bool {
        match self.conversation_repo.find_participants(conversation_id) {
            Ok(ps) => {
                let has = |u: &user::Id| ps.iter().any(|p| p.user_id == *u);
                has(a) && has(b)
            }
            Err(e) => {
                warn!("could not load participants of {conversation_id}: {e}");
                false
            }
        }
    }

    async fn replicate(&self, transition: Transition) {
        let update = Update {
            origin: self.origin,
            transition,
        };
        if let Err(e) = self.replicator.publish(&update).await {
            error!("failed to share call update {:?}: {e}", update.transition);
        }
    }

    async fn fail(&self, to: &user::Id, conversation_id: &conversation::Id, reason: FailReason) {
        self.broadcaster
            .emit_to_user(
                to,
                &Event::CallFailed {
                    conversation_id: *conversation_id,
                    reason,
                },
            )
            .await;
    }

    async fn notify(&self, users: &[user::Id], event: &Event) {
        for u in users {
            self.broadcaster.emit_to_user(u, event).await;
        }
    }
}
