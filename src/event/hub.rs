use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::user;

use super::Event;
use super::transport::EventTransport;

pub type ConnectionId = u64;

type Room = HashMap<ConnectionId, UnboundedSender<Event>>;

pub struct Connection {
    pub id: ConnectionId,
    pub outbox: UnboundedSender<Event>,
    pub inbox: UnboundedReceiver<Event>,
}

/// Per-user rooms of open realtime connections. A user is online while
/// their room is not empty.
#[derive(Clone, Default)]
pub struct Hub {
    rooms: Arc<RwLock<HashMap<user::Id, Room>>>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Opens a connection for `user` and pushes the fresh presence list to
    /// everyone connected.
    pub async fn register(&self, user: &user::Id) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbox, inbox) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.write().await;
        rooms.entry(*user).or_default().insert(id, outbox.clone());
        info!("{user} connected ({} online)", rooms.len());
        push_presence(&rooms);

        Connection { id, outbox, inbox }
    }

    /// Closes a connection. Returns true when it was the last one of
    /// `user`.
    pub async fn deregister(&self, user: &user::Id, id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;

        let Some(room) = rooms.get_mut(user) else {
            return false;
        };
        room.remove(&id);
        let last = room.is_empty();
        if last {
            rooms.remove(user);
        }
        info!("{user} disconnected ({} online)", rooms.len());
        push_presence(&rooms);

        last
    }

    pub async fn online(&self) -> Vec<user::Id> {
        online_of(&*self.rooms.read().await)
    }

    pub async fn is_online(&self, user: &user::Id) -> bool {
        self.rooms.read().await.contains_key(user)
    }
}

#[async_trait]
impl EventTransport for Hub {
    async fn deliver(&self, user: &user::Id, event: &Event) -> super::Result<()> {
        let rooms = self.rooms.read().await;
        match rooms.get(user) {
            Some(room) => {
                for tx in room.values() {
                    // a closed receiver belongs to a connection being torn down
                    let _ = tx.send(event.clone());
                }
            }
            None => debug!("{user} is offline, event dropped"),
        }
        Ok(())
    }
}

fn online_of(rooms: &HashMap<user::Id, Room>) -> Vec<user::Id> {
    let mut users = rooms.keys().copied().collect::<Vec<_>>();
    users.sort();
    users
}

fn push_presence(rooms: &HashMap<user::Id, Room>) {
    let event = Event::OnlineUsers {
        users: online_of(rooms),
    };
    for tx in rooms.values().flat_map(|room| room.values()) {
        let _ = tx.send(event.clone());
    }
}

#[cfg(test)]
mod test {
    use crate::conversation;

    use super::*;

    fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn should_push_presence_on_connect_and_disconnect() {
        let hub = Hub::default();
        let (a, b) = (user::Id::random(), user::Id::random());

        let mut conn_a = hub.register(&a).await;
        let conn_b = hub.register(&b).await;
        hub.deregister(&b, conn_b.id).await;

        let mut both = vec![a, b];
        both.sort();
        assert_eq!(
            drain(&mut conn_a.inbox),
            vec![
                Event::OnlineUsers { users: vec![a] },
                Event::OnlineUsers { users: both },
                Event::OnlineUsers { users: vec![a] },
            ]
        );
    }

    #[tokio::test]
    async fn should_stay_online_until_last_connection_closes() {
        let hub = Hub::default();
        let a = user::Id::random();

        let first = hub.register(&a).await;
        let second = hub.register(&a).await;

        assert!(!hub.deregister(&a, first.id).await);
        assert!(hub.is_online(&a).await);
        assert!(hub.deregister(&a, second.id).await);
        assert!(!hub.is_online(&a).await);
        assert!(hub.online().await.is_empty());
    }

    #[tokio::test]
    async fn should_deliver_to_every_connection_of_user_only() {
        let hub = Hub::default();
        let (a, b) = (user::Id::random(), user::Id::random());
        let mut phone = hub.register(&a).await.inbox;
        let mut laptop = hub.register(&a).await.inbox;
        let mut other = hub.register(&b).await.inbox;
        drain(&mut phone);
        drain(&mut laptop);
        drain(&mut other);

        let event = Event::RemovedFromGroup {
            conversation_id: conversation::Id::random(),
        };
        hub.deliver(&a, &event).await.unwrap();
        hub.deliver(&user::Id::random(), &event).await.unwrap();

        assert_eq!(drain(&mut phone), vec![event.clone()]);
        assert_eq!(drain(&mut laptop), vec![event]);
        assert!(drain(&mut other).is_empty());
    }
}
