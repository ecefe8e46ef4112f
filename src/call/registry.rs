use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{conversation, user};

use super::CallKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Ringing,
    Active,
}

/// Server-side view of the call running in one conversation.
#[derive(Clone, Debug)]
pub struct CallSession {
    pub kind: CallKind,
    pub initiator: user::Id,
    /// Everyone invited and not gone, initiator included.
    pub members: BTreeSet<user::Id>,
    /// Members that are actually in the call.
    pub joined: BTreeSet<user::Id>,
    pub phase: Phase,
    /// Distinguishes this session from a later one in the same
    /// conversation when a ring timeout fires.
    pub token: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub enum OfferOutcome {
    Started { token: Uuid },
    Relayed,
    /// Another call is running in the conversation.
    Busy,
    /// The target already left the running call.
    Gone,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Departure {
    pub remaining: Vec<user::Id>,
    pub ended: bool,
}

/// A change made to the registry of one instance, replayed by the others.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "op",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Transition {
    Start {
        conversation_id: conversation::Id,
        kind: CallKind,
        initiator: user::Id,
        members: Vec<user::Id>,
        token: Uuid,
    },
    Accept {
        conversation_id: conversation::Id,
        user: user::Id,
    },
    Leave {
        conversation_id: conversation::Id,
        user: user::Id,
    },
    Expire {
        conversation_id: conversation::Id,
        token: Uuid,
    },
}

impl CallSession {
    fn ringing(
        kind: CallKind,
        initiator: user::Id,
        members: BTreeSet<user::Id>,
        token: Uuid,
    ) -> Self {
        Self {
            kind,
            initiator,
            members,
            joined: BTreeSet::from([initiator]),
            phase: Phase::Ringing,
            token,
        }
    }
}

#[derive(Default)]
pub struct CallRegistry {
    sessions: HashMap<conversation::Id, CallSession>,
}

impl CallRegistry {
    pub fn offer(
        &mut self,
        conversation_id: &conversation::Id,
        from: &user::Id,
        to: &user::Id,
        kind: CallKind,
        invited: &[user::Id],
    ) -> OfferOutcome {
        if let Some(session) = self.sessions.get(conversation_id) {
            if !session.joined.contains(from) {
                return OfferOutcome::Busy;
            }
            if !session.members.contains(to) {
                return OfferOutcome::Gone;
            }
            return OfferOutcome::Relayed;
        }

        let token = Uuid::new_v4();

        let mut members = invited.iter().copied().collect::<BTreeSet<_>>();
        members.insert(*from);
        members.insert(*to);

        self.sessions
            .insert(*conversation_id, CallSession::ringing(kind, *from, members, token));
        OfferOutcome::Started { token }
    }

    /// Replays a change made by another instance. Starting a call that is
    /// already known keeps the local session.
    pub fn apply(&mut self, transition: &Transition) {
        match transition {
            Transition::Start {
                conversation_id,
                kind,
                initiator,
                members,
                token,
            } => {
                self.sessions.entry(*conversation_id).or_insert_with(|| {
                    let members = members.iter().copied().collect();
                    CallSession::ringing(*kind, *initiator, members, *token)
                });
            }
            Transition::Accept {
                conversation_id,
                user,
            } => {
                self.accept(conversation_id, user);
            }
            Transition::Leave {
                conversation_id,
                user,
            } => {
                self.leave(conversation_id, user);
            }
            Transition::Expire {
                conversation_id,
                token,
            } => {
                self.expire(conversation_id, *token);
            }
        }
    }

    /// The transition that recreates the session of `conversation_id`.
    pub fn start_of(&self, conversation_id: &conversation::Id) -> Option<Transition> {
        self.sessions.get(conversation_id).map(|s| Transition::Start {
            conversation_id: *conversation_id,
            kind: s.kind,
            initiator: s.initiator,
            members: s.members.iter().copied().collect(),
            token: s.token,
        })
    }

    /// Records that `user` picked up. Returns false when there is nothing to
    /// pick up.
    pub fn accept(&mut self, conversation_id: &conversation::Id, user: &user::Id) -> bool {
        match self.sessions.get_mut(conversation_id) {
            Some(session) if session.members.contains(user) => {
                session.joined.insert(*user);
                session.phase = Phase::Active;
                true
            }
            _ => false,
        }
    }

    /// Removes `user` from the call. The call ends when fewer than two
    /// members are left, nobody is in it anymore, or the initiator gives up
    /// before anyone answered.
    pub fn leave(
        &mut self,
        conversation_id: &conversation::Id,
        user: &user::Id,
    ) -> Option<Departure> {
        let session = self.sessions.get_mut(conversation_id)?;
        if !session.members.remove(user) {
            return None;
        }
        session.joined.remove(user);

        let ended = session.members.len() < 2
            || session.joined.is_empty()
            || (session.phase == Phase::Ringing && session.initiator == *user);
        let remaining = session.members.iter().copied().collect();

        if ended {
            self.sessions.remove(conversation_id);
        }
        Some(Departure { remaining, ended })
    }

    /// Drops the session if it is still the one identified by `token` and
    /// nobody answered yet. Returns its members.
    pub fn expire(
        &mut self,
        conversation_id: &conversation::Id,
        token: Uuid,
    ) -> Option<Vec<user::Id>> {
        match self.sessions.get(conversation_id) {
            Some(s) if s.token == token && s.phase == Phase::Ringing => self
                .sessions
                .remove(conversation_id)
                .map(|s| s.members.into_iter().collect()),
            _ => None,
        }
    }

    /// Removes `user` from every call it takes part in.
    pub fn drop_user(&mut self, user: &user::Id) -> Vec<(conversation::Id, Departure)> {
        let conversations = self
            .sessions
            .iter()
            .filter(|(_, s)| s.members.contains(user))
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();

        conversations
            .into_iter()
            .filter_map(|id| self.leave(&id, user).map(|d| (id, d)))
            .collect()
    }

    pub fn is_member(&self, conversation_id: &conversation::Id, user: &user::Id) -> bool {
        self.sessions
            .get(conversation_id)
            .is_some_and(|s| s.members.contains(user))
    }

    pub fn get(&self, conversation_id: &conversation::Id) -> Option<&CallSession> {
        self.sessions.get(conversation_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn users<const N: usize>() -> [user::Id; N] {
        std::array::from_fn(|_| user::Id::random())
    }

    #[test]
    fn should_reject_unrelated_second_call() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();

        assert!(matches!(
            registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b, c]),
            OfferOutcome::Started { .. }
        ));
        assert_eq!(
            registry.offer(&conv, &c, &a, CallKind::Video, &[a, b, c]),
            OfferOutcome::Busy
        );
        assert_eq!(
            registry.offer(&conv, &a, &c, CallKind::Audio, &[a, b, c]),
            OfferOutcome::Relayed
        );
    }

    #[test]
    fn should_let_joined_callee_offer_to_other_callee() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();
        registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b, c]);

        assert!(registry.accept(&conv, &b));

        assert_eq!(
            registry.offer(&conv, &b, &c, CallKind::Audio, &[a, b, c]),
            OfferOutcome::Relayed
        );
        assert_eq!(registry.get(&conv).unwrap().phase, Phase::Active);
    }

    #[test]
    fn should_not_relay_offers_to_members_who_left() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();
        registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b, c]);
        registry.accept(&conv, &b);
        registry.leave(&conv, &c);

        assert_eq!(
            registry.offer(&conv, &b, &c, CallKind::Audio, &[a, b, c]),
            OfferOutcome::Gone
        );
    }

    #[test]
    fn should_end_one_to_one_call_when_either_side_leaves() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b] = users();
        registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b]);

        let departure = registry.leave(&conv, &b).unwrap();

        assert_eq!(
            departure,
            Departure {
                remaining: vec![a],
                ended: true
            }
        );
        assert!(registry.get(&conv).is_none());
    }

    #[test]
    fn should_keep_group_call_running_while_two_members_remain() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();
        registry.offer(&conv, &a, &b, CallKind::Video, &[a, b, c]);
        registry.accept(&conv, &b);
        registry.accept(&conv, &c);

        let departure = registry.leave(&conv, &a).unwrap();

        assert!(!departure.ended);
        assert!(registry.is_member(&conv, &b));
        assert!(!registry.is_member(&conv, &a));
    }

    #[test]
    fn should_cancel_ringing_call_when_initiator_hangs_up() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();
        registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b, c]);

        let departure = registry.leave(&conv, &a).unwrap();

        assert!(departure.ended);
        assert_eq!(departure.remaining.len(), 2);
    }

    #[test]
    fn should_expire_only_unanswered_session_with_matching_token() {
        let mut registry = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b] = users();
        let OfferOutcome::Started { token } = registry.offer(&conv, &a, &b, CallKind::Audio, &[a, b])
        else {
            panic!("call should start");
        };

        assert_eq!(registry.expire(&conv, Uuid::new_v4()), None);
        registry.accept(&conv, &b);
        assert_eq!(registry.expire(&conv, token), None);

        registry.leave(&conv, &a);
        let OfferOutcome::Started { token } = registry.offer(&conv, &b, &a, CallKind::Audio, &[a, b])
        else {
            panic!("call should start");
        };
        let mut members = registry.expire(&conv, token).unwrap();
        members.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(members, expected);
    }

    #[test]
    fn should_drop_disconnected_user_from_every_call() {
        let mut registry = CallRegistry::default();
        let (c1, c2) = (conversation::Id::random(), conversation::Id::random());
        let [a, b, c] = users();
        registry.offer(&c1, &a, &b, CallKind::Audio, &[a, b]);
        registry.offer(&c2, &c, &a, CallKind::Audio, &[a, c]);

        let dropped = registry.drop_user(&a);

        assert_eq!(dropped.len(), 2);
        assert!(dropped.iter().all(|(_, d)| d.ended));
        assert!(registry.get(&c1).is_none());
        assert!(registry.get(&c2).is_none());
    }

    #[test]
    fn should_mirror_session_from_replayed_transitions() {
        let mut origin = CallRegistry::default();
        let mut mirror = CallRegistry::default();
        let conv = conversation::Id::random();
        let [a, b, c] = users();
        let OfferOutcome::Started { token } =
            origin.offer(&conv, &a, &b, CallKind::Video, &[a, b, c])
        else {
            panic!("call should start");
        };
        let start = origin.start_of(&conv).unwrap();

        mirror.apply(&start);
        mirror.apply(&start);
        assert_eq!(
            mirror.offer(&conv, &c, &a, CallKind::Audio, &[a, c]),
            OfferOutcome::Busy
        );

        mirror.apply(&Transition::Accept {
            conversation_id: conv,
            user: b,
        });
        mirror.apply(&Transition::Expire {
            conversation_id: conv,
            token,
        });
        let session = mirror.get(&conv).unwrap();
        assert_eq!(session.phase, Phase::Active);
        assert_eq!(session.initiator, a);
        assert!(session.joined.contains(&b));

        mirror.apply(&Transition::Leave {
            conversation_id: conv,
            user: a,
        });
        mirror.apply(&Transition::Leave {
            conversation_id: conv,
            user: b,
        });
        assert!(mirror.get(&conv).is_none());
    }
}
