use crate::models::{FriendshipRow, MessageRow, StoryRow, StoryViewRow, UserRow};
use crate::{Database, format_ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, Row, TransactionBehavior, params};
use uuid::Uuid;

use verdant_types::models::{Friendship, Message, Story, StoryView};

/// What `request_friendship` did with the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequest {
    Created,
    /// The addressee had already asked; their request is now accepted.
    Accepted,
    AlreadyPending,
    AlreadyFriends,
}

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, message_type, content, media_url, \
     media_size, media_duration, disappear_after_secs, is_delivered, delivered_at, is_viewed, \
     viewed_at, is_deleted, deleted_at, expires_at, created_at";

const STORY_COLUMNS: &str = "id, owner_id, content_type, media_url, media_size, duration_secs, \
     caption, privacy_level, created_at, expires_at, is_active, is_archived, archived_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns false if the username is already taken.
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, password_hash, format_ts(created_at)],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn user_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id.to_string()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Friendships --

    /// The friendship between two users, in whichever direction it was requested.
    pub fn find_friendship(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
        self.with_conn(|conn| query_friendship(conn, a, b))
    }

    /// Look up the pair and either open a request or accept the one the
    /// addressee already sent, in a single transaction.
    pub fn request_friendship(
        &self,
        requester: Uuid,
        addressee: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = match query_friendship(&tx, requester, addressee)? {
                Some(existing) if existing.is_accepted() => FriendRequest::AlreadyFriends,
                Some(existing) if existing.requester_id == addressee => {
                    tx.execute(
                        "UPDATE friendships SET status = 'accepted', accepted_at = ?3
                         WHERE requester_id = ?1 AND addressee_id = ?2 AND status = 'pending'",
                        params![addressee.to_string(), requester.to_string(), format_ts(now)],
                    )?;
                    FriendRequest::Accepted
                }
                Some(_) => FriendRequest::AlreadyPending,
                None => {
                    tx.execute(
                        "INSERT INTO friendships (requester_id, addressee_id, status, created_at)
                         VALUES (?1, ?2, 'pending', ?3)",
                        params![requester.to_string(), addressee.to_string(), format_ts(now)],
                    )?;
                    FriendRequest::Created
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn insert_friend_request(
        &self,
        requester: Uuid,
        addressee: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friendships (requester_id, addressee_id, status, created_at)
                 VALUES (?1, ?2, 'pending', ?3)",
                params![requester.to_string(), addressee.to_string(), format_ts(now)],
            )?;
            Ok(())
        })
    }

    /// Accept a pending request. Returns false if there was nothing to accept.
    pub fn accept_friend_request(
        &self,
        requester: Uuid,
        addressee: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE friendships SET status = 'accepted', accepted_at = ?3
                 WHERE requester_id = ?1 AND addressee_id = ?2 AND status = 'pending'",
                params![requester.to_string(), addressee.to_string(), format_ts(now)],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn list_friendships(&self, user_id: Uuid) -> Result<Vec<Friendship>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT requester_id, addressee_id, status, created_at, accepted_at
                 FROM friendships
                 WHERE requester_id = ?1 OR addressee_id = ?1
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], friendship_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(Friendship::try_from).collect()
    }

    pub fn set_close_friend(
        &self,
        owner: Uuid,
        friend: Uuid,
        close: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            if close {
                conn.execute(
                    "INSERT OR IGNORE INTO close_friends (owner_id, friend_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![owner.to_string(), friend.to_string(), format_ts(now)],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM close_friends WHERE owner_id = ?1 AND friend_id = ?2",
                    params![owner.to_string(), friend.to_string()],
                )?;
            }
            Ok(())
        })
    }

    /// Whether `owner` has marked `friend` as a close friend.
    pub fn is_close_friend(&self, owner: Uuid, friend: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let close = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM close_friends WHERE owner_id = ?1 AND friend_id = ?2)",
                params![owner.to_string(), friend.to_string()],
                |row| row.get(0),
            )?;
            Ok(close)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, message_type, content, media_url,
                     media_size, media_duration, disappear_after_secs, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.recipient_id.to_string(),
                    message.message_type.as_str(),
                    message.content,
                    message.media_url,
                    message.media_size,
                    message.media_duration,
                    message.disappear_after_secs,
                    format_ts(message.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            conn.prepare(&sql)?
                .query_row([id.to_string()], message_row)
                .optional()
        })?;
        row.map(Message::try_from).transpose()
    }

    /// The newest `limit` messages between two users created strictly before
    /// `before` (if given), returned oldest first.
    pub fn get_conversation(
        &self,
        a: Uuid,
        b: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![a.to_string(), b.to_string(), before.map(format_ts), limit],
                    message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Returns true only for the call that flipped the flag.
    pub fn mark_message_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_delivered = 1, delivered_at = ?2
                 WHERE id = ?1 AND is_delivered = 0",
                params![id.to_string(), format_ts(now)],
            )?;
            Ok(changed == 1)
        })
    }

    /// Mark everything `sender` sent to `recipient` as delivered.
    pub fn mark_conversation_delivered(
        &self,
        recipient: Uuid,
        sender: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_delivered = 1, delivered_at = ?3
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND is_delivered = 0",
                params![recipient.to_string(), sender.to_string(), format_ts(now)],
            )?;
            Ok(changed)
        })
    }

    /// First-view transition. The `is_viewed = 0` guard makes this a single
    /// conditional write, so `expires_at` can only ever be set once.
    /// Returns true only for the call that performed the transition.
    pub fn mark_message_viewed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET is_viewed = 1,
                     viewed_at = ?2,
                     expires_at = ?3,
                     is_delivered = 1,
                     delivered_at = COALESCE(delivered_at, ?2)
                 WHERE id = ?1 AND is_viewed = 0",
                params![id.to_string(), format_ts(now), expires_at.map(format_ts)],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn soft_delete_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1, deleted_at = ?2
                 WHERE id = ?1 AND is_deleted = 0",
                params![id.to_string(), format_ts(now)],
            )?;
            Ok(changed == 1)
        })
    }

    /// Drop stored content of messages that can no longer be shown.
    /// Metadata rows are kept.
    pub fn purge_hidden_message_content(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET content = NULL, media_url = NULL, media_size = NULL, media_duration = NULL
                 WHERE (is_deleted = 1 OR (expires_at IS NOT NULL AND expires_at <= ?1))
                   AND (content IS NOT NULL OR media_url IS NOT NULL)",
                [format_ts(now)],
            )?;
            Ok(changed)
        })
    }

    // -- Stories --

    pub fn insert_story(&self, story: &Story) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (id, owner_id, content_type, media_url, media_size, duration_secs,
                     caption, privacy_level, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    story.id.to_string(),
                    story.owner_id.to_string(),
                    story.content_type.as_str(),
                    story.media_url,
                    story.media_size,
                    story.duration_secs,
                    story.caption,
                    story.privacy_level.as_str(),
                    format_ts(story.created_at),
                    format_ts(story.expires_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_story(&self, id: Uuid) -> Result<Option<Story>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1");
            conn.prepare(&sql)?
                .query_row([id.to_string()], story_row)
                .optional()
        })?;
        row.map(Story::try_from).transpose()
    }

    /// Every story the owner ever posted, newest first. Visibility filtering
    /// happens in the caller.
    pub fn get_stories_by_owner(&self, owner: Uuid) -> Result<Vec<Story>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORY_COLUMNS} FROM stories WHERE owner_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner.to_string()], story_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(Story::try_from).collect()
    }

    pub fn archive_story(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET is_archived = 1, archived_at = ?2
                 WHERE id = ?1 AND is_archived = 0",
                params![id.to_string(), format_ts(now)],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn deactivate_story(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET is_active = 0 WHERE id = ?1 AND is_active = 1",
                [id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Physically remove stories that expired before `cutoff`, with their views.
    pub fn delete_stories_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cutoff = format_ts(cutoff);
            tx.execute(
                "DELETE FROM story_views
                 WHERE story_id IN (SELECT id FROM stories WHERE expires_at < ?1)",
                [&cutoff],
            )?;
            let deleted = tx.execute("DELETE FROM stories WHERE expires_at < ?1", [&cutoff])?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    // -- Story views --

    pub fn insert_story_view(&self, view: &StoryView) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO story_views (id, story_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    view.id.to_string(),
                    view.story_id.to_string(),
                    view.viewer_id.to_string(),
                    format_ts(view.viewed_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn count_story_views(&self, story_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM story_views WHERE story_id = ?1",
                [story_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn has_viewed_story(&self, story_id: Uuid, viewer_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let viewed = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM story_views WHERE story_id = ?1 AND viewer_id = ?2)",
                params![story_id.to_string(), viewer_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(viewed)
        })
    }

    /// View log for a story, newest first.
    pub fn get_story_views(&self, story_id: Uuid) -> Result<Vec<StoryView>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, story_id, viewer_id, viewed_at FROM story_views
                 WHERE story_id = ?1 ORDER BY viewed_at DESC",
            )?;
            let rows = stmt
                .query_map([story_id.to_string()], |row| {
                    Ok(StoryViewRow {
                        id: row.get(0)?,
                        story_id: row.get(1)?,
                        viewer_id: row.get(2)?,
                        viewed_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(StoryView::try_from).collect()
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, username, password, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_friendship(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
    let row = conn
        .query_row(
            "SELECT requester_id, addressee_id, status, created_at, accepted_at
             FROM friendships
             WHERE (requester_id = ?1 AND addressee_id = ?2)
                OR (requester_id = ?2 AND addressee_id = ?1)",
            params![a.to_string(), b.to_string()],
            friendship_row,
        )
        .optional()?;
    row.map(Friendship::try_from).transpose()
}

fn friendship_row(row: &Row<'_>) -> rusqlite::Result<FriendshipRow> {
    Ok(FriendshipRow {
        requester_id: row.get(0)?,
        addressee_id: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        accepted_at: row.get(4)?,
    })
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        message_type: row.get(3)?,
        content: row.get(4)?,
        media_url: row.get(5)?,
        media_size: row.get(6)?,
        media_duration: row.get(7)?,
        disappear_after_secs: row.get(8)?,
        is_delivered: row.get(9)?,
        delivered_at: row.get(10)?,
        is_viewed: row.get(11)?,
        viewed_at: row.get(12)?,
        is_deleted: row.get(13)?,
        deleted_at: row.get(14)?,
        expires_at: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn story_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content_type: row.get(2)?,
        media_url: row.get(3)?,
        media_size: row.get(4)?,
        duration_secs: row.get(5)?,
        caption: row.get(6)?,
        privacy_level: row.get(7)?,
        created_at: row.get(8)?,
        expires_at: row.get(9)?,
        is_active: row.get(10)?,
        is_archived: row.get(11)?,
        archived_at: row.get(12)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use verdant_types::models::ContentType;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn seeded() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.create_user(alice, "alice", "x", at(0)).unwrap();
        db.create_user(bob, "bob", "x", at(0)).unwrap();
        (db, alice, bob)
    }

    fn text(sender: Uuid, recipient: Uuid, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            message_type: ContentType::Text,
            content: Some("hello".into()),
            media_url: None,
            media_size: None,
            media_duration: None,
            disappear_after_secs: Some(60),
            is_delivered: false,
            delivered_at: None,
            is_viewed: false,
            viewed_at: None,
            is_deleted: false,
            deleted_at: None,
            expires_at: None,
            created_at,
        }
    }

    #[test]
    fn timestamps_round_trip_and_sort() {
        let early = format_ts(at(0));
        let late = format_ts(at(0) + Duration::microseconds(1));
        assert!(early < late);
        assert_eq!(crate::parse_ts(&early).unwrap(), at(0));
    }

    #[test]
    fn first_view_wins() {
        let (db, alice, bob) = seeded();
        let msg = text(alice, bob, at(0));
        db.insert_message(&msg).unwrap();

        assert!(db.mark_message_viewed(msg.id, at(10), Some(at(70))).unwrap());
        assert!(!db.mark_message_viewed(msg.id, at(20), Some(at(80))).unwrap());

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert!(stored.is_viewed && stored.is_delivered);
        assert_eq!(stored.viewed_at, Some(at(10)));
        assert_eq!(stored.expires_at, Some(at(70)));
    }

    #[test]
    fn conversation_pages_oldest_first() {
        let (db, alice, bob) = seeded();
        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
            db.insert_message(&text(from, to, at(i))).unwrap();
        }

        let all = db.get_conversation(alice, bob, 50, None).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let page = db.get_conversation(bob, alice, 2, Some(at(4))).unwrap();
        let times: Vec<_> = page.iter().map(|m| m.created_at).collect();
        assert_eq!(times, vec![at(2), at(3)]);
    }

    #[test]
    fn purge_keeps_metadata() {
        let (db, alice, bob) = seeded();
        let msg = text(alice, bob, at(0));
        db.insert_message(&msg).unwrap();
        db.mark_message_viewed(msg.id, at(1), Some(at(61))).unwrap();

        assert_eq!(db.purge_hidden_message_content(at(60)).unwrap(), 0);
        assert_eq!(db.purge_hidden_message_content(at(61)).unwrap(), 1);

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert!(stored.content.is_none());
        assert!(stored.is_viewed);
    }

    #[test]
    fn friendship_lookup_is_symmetric() {
        let (db, alice, bob) = seeded();
        assert!(db.find_friendship(alice, bob).unwrap().is_none());

        db.insert_friend_request(alice, bob, at(0)).unwrap();
        assert!(!db.accept_friend_request(bob, alice, at(1)).unwrap());
        assert!(db.accept_friend_request(alice, bob, at(1)).unwrap());

        let friendship = db.find_friendship(bob, alice).unwrap().unwrap();
        assert!(friendship.is_accepted());
        assert_eq!(friendship.other(bob), alice);
    }

    #[test]
    fn duplicate_username_is_reported_not_raised() {
        let (db, _, _) = seeded();
        assert!(!db.create_user(Uuid::new_v4(), "alice", "y", at(1)).unwrap());
        assert!(db.create_user(Uuid::new_v4(), "carol", "y", at(1)).unwrap());
    }

    #[test]
    fn request_friendship_keeps_one_row_per_pair() {
        let (db, alice, bob) = seeded();
        assert_eq!(db.request_friendship(alice, bob, at(0)).unwrap(), FriendRequest::Created);
        assert_eq!(
            db.request_friendship(alice, bob, at(1)).unwrap(),
            FriendRequest::AlreadyPending
        );
        assert_eq!(db.request_friendship(bob, alice, at(2)).unwrap(), FriendRequest::Accepted);
        assert_eq!(
            db.request_friendship(bob, alice, at(3)).unwrap(),
            FriendRequest::AlreadyFriends
        );
        assert_eq!(db.list_friendships(alice).unwrap().len(), 1);

        // The reverse direction cannot sneak in a second row.
        assert!(db.insert_friend_request(bob, alice, at(4)).is_err());
    }
}
