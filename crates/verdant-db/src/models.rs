//! Database row types. These map directly to SQLite rows and are converted
//! into `verdant-types` models at the edge of this crate.

use anyhow::{Result, anyhow};
use uuid::Uuid;

use verdant_types::models::{Friendship, Message, Story, StoryView};

use crate::parse_ts;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct FriendshipRow {
    pub requester_id: String,
    pub addressee_id: String,
    pub status: String,
    pub created_at: String,
    pub accepted_at: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub message_type: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_size: Option<i64>,
    pub media_duration: Option<f64>,
    pub disappear_after_secs: Option<i64>,
    pub is_delivered: bool,
    pub delivered_at: Option<String>,
    pub is_viewed: bool,
    pub viewed_at: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

pub struct StoryRow {
    pub id: String,
    pub owner_id: String,
    pub content_type: String,
    pub media_url: String,
    pub media_size: i64,
    pub duration_secs: f64,
    pub caption: Option<String>,
    pub privacy_level: String,
    pub created_at: String,
    pub expires_at: String,
    pub is_active: bool,
    pub is_archived: bool,
    pub archived_at: Option<String>,
}

pub struct StoryViewRow {
    pub id: String,
    pub story_id: String,
    pub viewer_id: String,
    pub viewed_at: String,
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().map_err(|e| anyhow!("Corrupt id '{}': {}", raw, e))
}

fn parse_opt_ts(raw: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    raw.map(parse_ts).transpose()
}

impl UserRow {
    pub fn user_id(&self) -> Result<Uuid> {
        parse_id(&self.id)
    }
}

impl TryFrom<FriendshipRow> for Friendship {
    type Error = anyhow::Error;

    fn try_from(row: FriendshipRow) -> Result<Self> {
        Ok(Self {
            requester_id: parse_id(&row.requester_id)?,
            addressee_id: parse_id(&row.addressee_id)?,
            status: row.status.parse()?,
            created_at: parse_ts(&row.created_at)?,
            accepted_at: parse_opt_ts(row.accepted_at.as_deref())?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id)?,
            sender_id: parse_id(&row.sender_id)?,
            recipient_id: parse_id(&row.recipient_id)?,
            message_type: row.message_type.parse()?,
            content: row.content,
            media_url: row.media_url,
            media_size: row.media_size,
            media_duration: row.media_duration,
            disappear_after_secs: row.disappear_after_secs,
            is_delivered: row.is_delivered,
            delivered_at: parse_opt_ts(row.delivered_at.as_deref())?,
            is_viewed: row.is_viewed,
            viewed_at: parse_opt_ts(row.viewed_at.as_deref())?,
            is_deleted: row.is_deleted,
            deleted_at: parse_opt_ts(row.deleted_at.as_deref())?,
            expires_at: parse_opt_ts(row.expires_at.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<StoryRow> for Story {
    type Error = anyhow::Error;

    fn try_from(row: StoryRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id)?,
            owner_id: parse_id(&row.owner_id)?,
            content_type: row.content_type.parse()?,
            media_url: row.media_url,
            media_size: row.media_size,
            duration_secs: row.duration_secs,
            caption: row.caption,
            privacy_level: row.privacy_level.parse()?,
            created_at: parse_ts(&row.created_at)?,
            expires_at: parse_ts(&row.expires_at)?,
            is_active: row.is_active,
            is_archived: row.is_archived,
            archived_at: parse_opt_ts(row.archived_at.as_deref())?,
        })
    }
}

impl TryFrom<StoryViewRow> for StoryView {
    type Error = anyhow::Error;

    fn try_from(row: StoryViewRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id)?,
            story_id: parse_id(&row.story_id)?,
            viewer_id: parse_id(&row.viewer_id)?,
            viewed_at: parse_ts(&row.viewed_at)?,
        })
    }
}
