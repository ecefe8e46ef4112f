use std::sync::Arc;

use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use crate::user;

use super::Event;
use super::hub::ConnectionId;

/// State shared by the read and write halves of one websocket.
#[derive(Clone)]
pub struct Ws {
    pub user: user::Id,
    pub connection: ConnectionId,
    outbox: UnboundedSender<Event>,
    pub close: Arc<Notify>,
}

impl Ws {
    pub fn new(user: user::Id, connection: ConnectionId, outbox: UnboundedSender<Event>) -> Self {
        Self {
            user,
            connection,
            outbox,
            close: Arc::new(Notify::new()),
        }
    }

    /// Sends `event` to this connection only.
    pub fn reply(&self, event: Event) -> super::Result<()> {
        self.outbox
            .send(event)
            .map_err(|_| super::Error::Closed(self.connection))
    }
}
