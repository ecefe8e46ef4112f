use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::event::{Command, Event};
use crate::{conversation, user};

use super::peer::{Connection, Devices, Factory, PeerState, Signal, Track, TrackKind};
use super::{
    CallKind, CallerInfo, Error, IceCandidate, MAX_PARTICIPANTS, SessionDescription,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub conversation_id: conversation::Id,
    pub kind: CallKind,
    /// Whoever placed the call. It offers to everyone else.
    pub initiator: user::Id,
    /// Everyone in the call, the local user included.
    pub participants: Vec<user::Id>,
}

enum CallState {
    Idle,
    Calling {
        ctx: CallContext,
    },
    Ringing {
        ctx: CallContext,
        caller: CallerInfo,
        /// Offers waiting for the user to pick up, in arrival order.
        offers: Vec<(user::Id, SessionDescription)>,
    },
    Active {
        ctx: CallContext,
        started_at: Instant,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Calling,
    Ringing,
    Active,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calling => "calling",
            Self::Ringing => "ringing",
            Self::Active => "active",
        }
    }
}

struct Peer {
    conn: Connection,
    remote_set: bool,
}

/// Client side of a call: owns local media and one peer connection per
/// other participant (full mesh).
pub struct Coordinator {
    me: user::Id,
    devices: Devices,
    factory: Factory,
    signaler: Signal,

    state: CallState,
    peers: HashMap<user::Id, Peer>,
    /// Remote candidates received before the remote description of their
    /// peer was applied.
    pending_ice: HashMap<user::Id, Vec<IceCandidate>>,
    tracks: Vec<Track>,
}

impl Coordinator {
    pub fn new(me: user::Id, devices: Devices, factory: Factory, signaler: Signal) -> Self {
        Self {
            me,
            devices,
            factory,
            signaler,
            state: CallState::Idle,
            peers: HashMap::new(),
            pending_ice: HashMap::new(),
            tracks: Vec::new(),
        }
    }
}

impl Coordinator {
    pub async fn start_call(
        &mut self,
        conversation_id: conversation::Id,
        participants: &[user::Id],
        kind: CallKind,
        caller: CallerInfo,
    ) -> super::Result<()> {
        self.ensure(Phase::Idle, "start a call")?;

        let mut everyone = vec![self.me];
        for p in participants {
            if !everyone.contains(p) {
                everyone.push(*p);
            }
        }
        if everyone.len() < 2 {
            return Err(Error::Signaling("nobody to call".into()));
        }
        if everyone.len() > MAX_PARTICIPANTS {
            return Err(Error::Signaling(format!(
                "a call takes at most {MAX_PARTICIPANTS} participants"
            )));
        }

        self.tracks = self.devices.acquire(kind).await?;

        let ctx = CallContext {
            conversation_id,
            kind,
            initiator: self.me,
            participants: everyone,
        };
        self.state = CallState::Calling { ctx: ctx.clone() };
        info!("calling {} peer(s) in {conversation_id}", ctx.participants.len() - 1);

        let me = self.me;
        let mut sent = false;
        for peer in ctx.participants.iter().filter(|p| **p != me) {
            if let Err(e) = self.offer_to(&ctx, peer, &caller).await {
                warn!("could not call {peer} in {conversation_id}: {e}");
                self.abort(&conversation_id, sent).await;
                return Err(e);
            }
            sent = true;
        }
        Ok(())
    }

    pub async fn accept_call(&mut self, answerer: CallerInfo) -> super::Result<()> {
        let (ctx, offers) = match &self.state {
            CallState::Ringing { ctx, offers, .. } => (ctx.clone(), offers.clone()),
            _ => return Err(self.invalid("accept a call")),
        };

        // stays ringing when the devices are unavailable
        self.tracks = self.devices.acquire(ctx.kind).await?;

        let conversation_id = ctx.conversation_id;
        let mut sent = false;
        for (peer, offer) in offers {
            if let Err(e) = self.answer_peer(&conversation_id, &peer, offer).await {
                warn!("could not answer {peer} in {conversation_id}: {e}");
                self.abort(&conversation_id, sent).await;
                return Err(e);
            }
            sent = true;
        }

        info!("call in {conversation_id} is active");
        self.state = CallState::Active {
            ctx: ctx.clone(),
            started_at: Instant::now(),
        };

        // the initiator offers to everyone, between callees the lower id offers
        let later = ctx
            .participants
            .iter()
            .copied()
            .filter(|p| *p > self.me && *p != ctx.initiator && !self.peers.contains_key(p))
            .collect::<Vec<_>>();
        for peer in later {
            if let Err(e) = self.offer_to(&ctx, &peer, &answerer).await {
                warn!("could not reach {peer} in {conversation_id}: {e}");
                self.drop_peer(&peer);
            }
        }
        Ok(())
    }

    pub async fn decline_call(&mut self) -> super::Result<()> {
        let conversation_id = match &self.state {
            CallState::Ringing { ctx, .. } => ctx.conversation_id,
            _ => return Err(self.invalid("decline a call")),
        };

        debug!("declining call in {conversation_id}");
        let sent = self
            .signaler
            .send(Command::DeclineCall { conversation_id })
            .await;
        self.cleanup();
        sent
    }

    /// Hangs up. Does nothing when there is no call.
    pub async fn end_call(&mut self) -> super::Result<()> {
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(());
        };

        debug!("ending call in {conversation_id}");
        let sent = self.signaler.send(Command::EndCall { conversation_id }).await;
        self.cleanup();
        sent
    }

    /// Closes every peer connection, stops local media and forgets the
    /// call. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        for (_, peer) in self.peers.drain() {
            peer.conn.close();
        }
        for track in self.tracks.drain(..) {
            track.stop();
        }
        self.pending_ice.clear();
        self.state = CallState::Idle;
    }

    /// Returns true when the microphone is muted afterwards.
    pub fn toggle_mute(&self) -> bool {
        let audio = self.tracks_of(TrackKind::Audio);
        let mute = audio.iter().any(|t| t.is_enabled());
        for t in &audio {
            t.set_enabled(!mute);
        }
        mute
    }

    /// Returns true when the camera is on afterwards.
    pub fn toggle_video(&self) -> bool {
        let video = self.tracks_of(TrackKind::Video);
        let on = !video.iter().any(|t| t.is_enabled());
        for t in &video {
            t.set_enabled(on);
        }
        on && !video.is_empty()
    }

    pub async fn handle(&mut self, event: Event) -> super::Result<()> {
        match event {
            Event::IncomingCall {
                conversation_id,
                from,
                offer,
                call_type,
                caller,
                initiator,
                participants,
            } => {
                let ctx = CallContext {
                    conversation_id,
                    kind: call_type,
                    initiator,
                    participants,
                };
                self.on_incoming(ctx, from, offer, caller).await
            }
            Event::CallAccepted {
                conversation_id,
                from,
                answer,
            } => self.on_accepted(&conversation_id, &from, answer).await,
            Event::IceCandidate {
                conversation_id,
                from,
                candidate,
            } => {
                self.on_remote_candidate(&conversation_id, from, candidate)
                    .await;
                Ok(())
            }
            Event::CallEnded {
                conversation_id,
                from,
                reason,
            } => {
                debug!("call in {conversation_id} ended by {from:?}: {reason:?}");
                self.on_peer_left(&conversation_id, from.as_ref());
                Ok(())
            }
            Event::CallDeclined {
                conversation_id,
                from,
            } => {
                debug!("{from} declined the call in {conversation_id}");
                self.on_peer_left(&conversation_id, Some(&from));
                Ok(())
            }
            Event::CallFailed {
                conversation_id,
                reason,
            } => {
                if self.in_call(&conversation_id) {
                    warn!("call in {conversation_id} failed: {reason:?}");
                    self.cleanup();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Forwards a candidate gathered locally for `peer`.
    pub async fn on_local_candidate(
        &self,
        peer: &user::Id,
        candidate: IceCandidate,
    ) -> super::Result<()> {
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(());
        };
        if !self.peers.contains_key(peer) {
            debug!("dropping local candidate for unknown peer {peer}");
            return Ok(());
        }

        self.signaler
            .send(Command::IceCandidate {
                conversation_id,
                to: *peer,
                candidate,
            })
            .await
    }

    pub fn on_peer_state(&self, peer: &user::Id, state: PeerState) {
        match state {
            PeerState::Failed | PeerState::Disconnected => {
                warn!("connection to {peer} is {state:?}, keeping the call")
            }
            _ => debug!("connection to {peer} is {state:?}"),
        }
    }

    /// Local capture stopped outside of the call, e.g. the device was
    /// unplugged.
    pub async fn on_local_media_ended(&mut self) -> super::Result<()> {
        info!("local media ended");
        self.end_call().await
    }
}

impl Coordinator {
    pub fn phase(&self) -> Phase {
        match self.state {
            CallState::Idle => Phase::Idle,
            CallState::Calling { .. } => Phase::Calling,
            CallState::Ringing { .. } => Phase::Ringing,
            CallState::Active { .. } => Phase::Active,
        }
    }

    pub fn context(&self) -> Option<&CallContext> {
        match &self.state {
            CallState::Idle => None,
            CallState::Calling { ctx }
            | CallState::Ringing { ctx, .. }
            | CallState::Active { ctx, .. } => Some(ctx),
        }
    }

    pub fn conversation_id(&self) -> Option<conversation::Id> {
        self.context().map(|c| c.conversation_id)
    }

    pub fn caller(&self) -> Option<&CallerInfo> {
        match &self.state {
            CallState::Ringing { caller, .. } => Some(caller),
            _ => None,
        }
    }

    /// Whole seconds since the call became active.
    pub fn duration(&self) -> Duration {
        match &self.state {
            CallState::Active { started_at, .. } => {
                Duration::from_secs(started_at.elapsed().as_secs())
            }
            _ => Duration::ZERO,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn local_track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Coordinator {
    async fn on_incoming(
        &mut self,
        ctx: CallContext,
        from: user::Id,
        offer: SessionDescription,
        caller: CallerInfo,
    ) -> super::Result<()> {
        let conversation_id = ctx.conversation_id;

        if let CallState::Idle = self.state {
            info!("incoming {:?} call from {} in {conversation_id}", ctx.kind, caller.name);
            self.state = CallState::Ringing {
                ctx,
                caller,
                offers: vec![(from, offer)],
            };
            return Ok(());
        }

        if !self.in_call(&conversation_id) {
            debug!("busy, ignoring call from {from} in {conversation_id}");
            return Ok(());
        }

        if let CallState::Ringing { offers, .. } = &mut self.state {
            debug!("buffering offer from {from} in {conversation_id}");
            offers.retain(|(p, _)| *p != from);
            offers.push((from, offer));
            return Ok(());
        }

        if let CallState::Active { .. } = self.state {
            debug!("{from} joins the call in {conversation_id}");
            return self.answer_peer(&conversation_id, &from, offer).await;
        }

        debug!("ignoring offer from {from} while calling in {conversation_id}");
        Ok(())
    }

    async fn on_accepted(
        &mut self,
        conversation_id: &conversation::Id,
        from: &user::Id,
        answer: SessionDescription,
    ) -> super::Result<()> {
        if !self.in_call(conversation_id) {
            return Ok(());
        }
        let Some(conn) = self.peers.get(from).map(|p| p.conn.clone()) else {
            warn!("answer from {from} without a pending offer in {conversation_id}");
            return Ok(());
        };

        conn.set_remote_description(&answer).await?;
        self.remote_applied(from).await;

        if let CallState::Calling { ctx } = &self.state {
            info!("{from} answered, call in {conversation_id} is active");
            self.state = CallState::Active {
                ctx: ctx.clone(),
                started_at: Instant::now(),
            };
        }
        Ok(())
    }

    async fn on_remote_candidate(
        &mut self,
        conversation_id: &conversation::Id,
        from: user::Id,
        candidate: IceCandidate,
    ) {
        if !self.in_call(conversation_id) {
            debug!("dropping candidate from {from}: not in a call in {conversation_id}");
            return;
        }

        match self.peers.get(&from) {
            Some(peer) if peer.remote_set => {
                if let Err(e) = peer.conn.add_ice_candidate(&candidate).await {
                    warn!("could not add candidate from {from}: {e}");
                }
            }
            _ => self.pending_ice.entry(from).or_default().push(candidate),
        }
    }

    fn on_peer_left(&mut self, conversation_id: &conversation::Id, from: Option<&user::Id>) {
        if !self.in_call(conversation_id) {
            return;
        }
        let Some(peer) = from else {
            info!("call in {conversation_id} is over");
            self.cleanup();
            return;
        };

        self.drop_peer(peer);
        let nobody_left = match &mut self.state {
            CallState::Ringing { offers, .. } => {
                offers.retain(|(p, _)| p != peer);
                offers.is_empty()
            }
            _ => self.peers.is_empty(),
        };
        if nobody_left {
            info!("nobody left in the call in {conversation_id}");
            self.cleanup();
        }
    }

    async fn offer_to(
        &mut self,
        ctx: &CallContext,
        peer: &user::Id,
        caller: &CallerInfo,
    ) -> super::Result<()> {
        let conn = self.connect(peer).await?;
        let offer = conn.create_offer().await?;
        conn.set_local_description(&offer).await?;

        debug!("sending offer to {peer} in {}", ctx.conversation_id);
        self.signaler
            .send(Command::CallUser {
                conversation_id: ctx.conversation_id,
                to: *peer,
                offer,
                call_type: ctx.kind,
                caller: caller.clone(),
                participants: ctx.participants.clone(),
            })
            .await
    }

    async fn answer_peer(
        &mut self,
        conversation_id: &conversation::Id,
        peer: &user::Id,
        offer: SessionDescription,
    ) -> super::Result<()> {
        let conn = self.connect(peer).await?;
        conn.set_remote_description(&offer).await?;
        let answer = conn.create_answer().await?;
        conn.set_local_description(&answer).await?;

        debug!("sending answer to {peer} in {conversation_id}");
        self.signaler
            .send(Command::AnswerCall {
                conversation_id: *conversation_id,
                to: *peer,
                answer,
            })
            .await?;

        self.remote_applied(peer).await;
        Ok(())
    }

    async fn connect(&mut self, peer: &user::Id) -> super::Result<Connection> {
        self.drop_peer_connection(peer);

        let conn = self.factory.connect(peer).await?;
        self.peers.insert(
            *peer,
            Peer {
                conn: conn.clone(),
                remote_set: false,
            },
        );
        for track in &self.tracks {
            conn.add_track(track)?;
        }
        Ok(conn)
    }

    /// Marks the remote description of `peer` as applied and drains the
    /// candidates that waited for it, in arrival order.
    async fn remote_applied(&mut self, peer: &user::Id) {
        let Some(p) = self.peers.get_mut(peer) else {
            return;
        };
        p.remote_set = true;
        let conn = p.conn.clone();

        let queued = self.pending_ice.remove(peer).unwrap_or_default();
        if !queued.is_empty() {
            debug!("applying {} queued candidate(s) from {peer}", queued.len());
        }
        for candidate in queued {
            if let Err(e) = conn.add_ice_candidate(&candidate).await {
                warn!("could not add queued candidate from {peer}: {e}");
            }
        }
    }

    async fn abort(&mut self, conversation_id: &conversation::Id, signaled: bool) {
        if signaled {
            let end = Command::EndCall {
                conversation_id: *conversation_id,
            };
            if let Err(e) = self.signaler.send(end).await {
                warn!("could not signal the end of the call in {conversation_id}: {e}");
            }
        }
        self.cleanup();
    }

    fn drop_peer(&mut self, peer: &user::Id) {
        self.drop_peer_connection(peer);
        self.pending_ice.remove(peer);
    }

    fn drop_peer_connection(&mut self, peer: &user::Id) {
        if let Some(p) = self.peers.remove(peer) {
            p.conn.close();
        }
    }

    fn in_call(&self, conversation_id: &conversation::Id) -> bool {
        self.conversation_id() == Some(*conversation_id)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    fn ensure(&self, phase: Phase, action: &'static str) -> super::Result<()> {
        if self.phase() == phase {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidState {
            action,
            state: self.phase().as_str(),
        }
    }
}
