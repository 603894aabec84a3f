use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use verdant_types::events::GatewayEvent;

use crate::channel::{CLOSE_NORMAL, CLOSE_SESSION_REPLACED, Channel};

/// Maps each connected user to their single live channel.
///
/// Constructed once at startup and cloned into handlers. All mutation goes
/// through one write lock, which serializes connect/disconnect per user and
/// is never held across an await on I/O.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    channels: RwLock<HashMap<Uuid, Channel>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` as the user's live channel. An existing channel is
    /// closed first. Returns true if a previous session was displaced.
    pub async fn connect(&self, user_id: Uuid, channel: Channel) -> bool {
        let conn_id = channel.id();
        let mut channels = self.inner.channels.write().await;

        let displaced = channels.remove(&user_id);
        if let Some(old) = &displaced {
            info!(
                "User {} reconnected: closing channel {} in favour of {}",
                user_id,
                old.id(),
                conn_id
            );
            old.close(CLOSE_SESSION_REPLACED, "session replaced");
        }

        channel.push(GatewayEvent::ConnectionEstablished { user_id });
        channels.insert(user_id, channel);
        debug!("User {} registered channel {}", user_id, conn_id);

        displaced.is_some()
    }

    /// Remove and close the user's channel. A no-op if none is registered.
    pub async fn disconnect(&self, user_id: Uuid) -> bool {
        let removed = self.inner.channels.write().await.remove(&user_id);
        match removed {
            Some(channel) => {
                channel.close(CLOSE_NORMAL, "disconnected");
                info!("User {} disconnected (channel {})", user_id, channel.id());
                true
            }
            None => false,
        }
    }

    /// Teardown path for a connection's own task: removes the entry only if
    /// `conn_id` is still the registered channel, so a displaced session can
    /// never evict the session that replaced it.
    pub async fn release(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut channels = self.inner.channels.write().await;
        let is_current = channels.get(&user_id).is_some_and(|ch| ch.id() == conn_id);
        if !is_current {
            return false;
        }
        if let Some(channel) = channels.remove(&user_id) {
            channel.close(CLOSE_NORMAL, "disconnected");
        }
        debug!("User {} released channel {}", user_id, conn_id);
        true
    }

    /// Deliver an event to a user's live channel.
    ///
    /// Returns false when the user is offline. A failed write means the
    /// channel's writer has gone away; the entry is released so the next
    /// send sees the user as offline.
    pub async fn send(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let dead_conn = {
            let channels = self.inner.channels.read().await;
            let Some(channel) = channels.get(&user_id) else {
                return false;
            };
            if channel.push(event) {
                return true;
            }
            channel.id()
        };

        warn!("Channel {} for user {} is dead, releasing", dead_conn, user_id);
        self.release(user_id, dead_conn).await;
        false
    }

    /// `send` to each user. Individual failures are tolerated.
    /// Returns how many users the event reached.
    pub async fn broadcast(&self, user_ids: &[Uuid], event: GatewayEvent) -> usize {
        let mut delivered = 0;
        for &user_id in user_ids {
            if self.send(user_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send a `system_message` to every live channel.
    pub async fn announce(&self, message: &str) -> usize {
        let users = self.online_users().await;
        let event = GatewayEvent::SystemMessage {
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.broadcast(&users, event).await
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.channels.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.channels.read().await.keys().copied().collect()
    }

    /// The subset of `user_ids` currently connected.
    pub async fn online_among(&self, user_ids: &[Uuid]) -> Vec<Uuid> {
        let channels = self.inner.channels.read().await;
        user_ids
            .iter()
            .copied()
            .filter(|id| channels.contains_key(id))
            .collect()
    }
}
