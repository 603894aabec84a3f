use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use verdant_db::Database;

use crate::blocking;
use crate::clock::Clock;
use crate::error::Result;

/// What one reaper pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub stories_deleted: usize,
    pub messages_purged: usize,
}

/// Background task that reclaims storage from expired content.
///
/// Correctness never depends on this loop: every read path checks expiry
/// itself. It only deletes stories that expired more than `retention` ago
/// and nulls out message content that can no longer be shown.
pub async fn run_reaper_loop(
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: chrono::Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match reap_once(&db, clock.as_ref(), retention).await {
            Ok(stats) => {
                if stats != ReapStats::default() {
                    info!(
                        "Reaper: deleted {} stories, purged content of {} messages",
                        stats.stories_deleted, stats.messages_purged
                    );
                }
            }
            Err(e) => {
                warn!("Reaper error: {}", e);
            }
        }
    }
}

pub async fn reap_once(
    db: &Arc<Database>,
    clock: &dyn Clock,
    retention: chrono::Duration,
) -> Result<ReapStats> {
    let now = clock.now();
    let cutoff = now - retention;
    let db = db.clone();
    blocking(move || {
        let stories_deleted = db.delete_stories_expired_before(cutoff)?;
        let messages_purged = db.purge_hidden_message_content(now)?;
        Ok(ReapStats {
            stories_deleted,
            messages_purged,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{setup, t0, user};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;
    use verdant_types::models::{
        ContentType, Message, PrivacyLevel, Story, StoryContentType, StoryView,
    };

    fn story(owner: Uuid) -> Story {
        Story {
            id: Uuid::new_v4(),
            owner_id: owner,
            content_type: StoryContentType::Video,
            media_url: "https://cdn.example/v.mp4".into(),
            media_size: 10,
            duration_secs: 3.0,
            caption: None,
            privacy_level: PrivacyLevel::Public,
            created_at: t0(),
            expires_at: Story::expiry_for(t0()),
            is_active: true,
            is_archived: false,
            archived_at: None,
        }
    }

    #[tokio::test]
    async fn keeps_stories_within_retention() {
        let (db, clock) = setup();
        let owner = user(&db, "owner");
        let viewer = user(&db, "viewer");
        let s = story(owner);
        db.insert_story(&s).unwrap();
        db.insert_story_view(&StoryView {
            id: Uuid::new_v4(),
            story_id: s.id,
            viewer_id: viewer,
            viewed_at: t0(),
        })
        .unwrap();

        let retention = ChronoDuration::hours(168);

        // Expired but still inside the retention window.
        clock.set(s.expires_at + ChronoDuration::hours(1));
        let stats = reap_once(&db, clock.as_ref(), retention).await.unwrap();
        assert_eq!(stats.stories_deleted, 0);
        assert!(db.get_story(s.id).unwrap().is_some());

        clock.set(s.expires_at + retention + ChronoDuration::seconds(1));
        let stats = reap_once(&db, clock.as_ref(), retention).await.unwrap();
        assert_eq!(stats.stories_deleted, 1);
        assert!(db.get_story(s.id).unwrap().is_none());
        assert_eq!(db.count_story_views(s.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn purges_content_of_expired_messages() {
        let (db, clock) = setup();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: a,
            recipient_id: b,
            message_type: ContentType::Text,
            content: Some("gone soon".into()),
            media_url: None,
            media_size: None,
            media_duration: None,
            disappear_after_secs: Some(10),
            is_delivered: false,
            delivered_at: None,
            is_viewed: false,
            viewed_at: None,
            is_deleted: false,
            deleted_at: None,
            expires_at: None,
            created_at: t0(),
        };
        db.insert_message(&message).unwrap();
        db.mark_message_viewed(message.id, t0(), Some(t0() + ChronoDuration::seconds(10)))
            .unwrap();

        let stats = reap_once(&db, clock.as_ref(), ChronoDuration::zero()).await.unwrap();
        assert_eq!(stats.messages_purged, 0);

        clock.advance(ChronoDuration::seconds(10));
        let stats = reap_once(&db, clock.as_ref(), ChronoDuration::zero()).await.unwrap();
        assert_eq!(stats.messages_purged, 1);

        let stored = db.get_message(message.id).unwrap().unwrap();
        assert!(stored.content.is_none());
        assert!(stored.is_viewed);
    }
}
