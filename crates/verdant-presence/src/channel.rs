use tokio::sync::mpsc;
use uuid::Uuid;

use verdant_types::events::GatewayEvent;

/// Close code sent to a channel displaced by a newer session for the same user.
pub const CLOSE_SESSION_REPLACED: u16 = 4002;

/// Close code for a server-initiated disconnect.
pub const CLOSE_NORMAL: u16 = 1000;

/// Items queued for a channel's writer task, in wire order.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(GatewayEvent),
    /// Send a close frame and stop writing.
    Close { code: u16, reason: &'static str },
}

pub type ChannelReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Live connection handle. Owned by the registry once connected.
///
/// Writes never block: the queue is drained by the connection's own task,
/// so the registry lock is never held across socket I/O.
#[derive(Debug)]
pub struct Channel {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Channel {
    /// Open a channel with a fresh connection id. The receiver side belongs
    /// to the task that writes to the socket.
    pub fn open() -> (Self, ChannelReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send-only handle to this channel for replies on the same connection.
    pub fn replier(&self) -> Replier {
        Replier {
            tx: self.tx.clone(),
        }
    }

    /// Queue an event. False once the writer task has gone away.
    pub(crate) fn push(&self, event: GatewayEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    pub(crate) fn close(&self, code: u16, reason: &'static str) {
        let _ = self.tx.send(Outbound::Close { code, reason });
    }
}

/// Reply path for the task that owns a connection.
#[derive(Debug, Clone)]
pub struct Replier {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Replier {
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }
}
