pub mod clock;
pub mod error;
pub mod friendship;
pub mod messages;
pub mod reaper;
pub mod stories;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LifecycleError, Result};
pub use friendship::{FriendshipGate, Relationship};
pub use messages::{MessageService, NewMessage};
pub use reaper::{ReapStats, reap_once, run_reaper_loop};
pub use stories::StoryService;

use tracing::error;

/// Run blocking storage work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        LifecycleError::Storage(anyhow::anyhow!("storage task failed: {}", e))
    })?
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;
    use verdant_db::Database;

    use crate::clock::ManualClock;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    pub fn setup() -> (Arc<Database>, Arc<ManualClock>) {
        (
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(ManualClock::new(t0())),
        )
    }

    pub fn user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, name, "hash", t0()).unwrap();
        id
    }

    pub fn befriend(db: &Database, a: Uuid, b: Uuid) {
        db.insert_friend_request(a, b, t0()).unwrap();
        assert!(db.accept_friend_request(a, b, t0()).unwrap());
    }
}
