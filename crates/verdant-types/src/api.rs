use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContentType, Friendship, FriendshipStatus, Message, Story};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseFriendRequest {
    pub close_friend: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendResponse {
    pub user_id: Uuid,
    pub status: FriendshipStatus,
    /// True when the caller sent the request.
    pub outgoing: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl FriendResponse {
    pub fn from_friendship(friendship: &Friendship, viewer: Uuid) -> Self {
        Self {
            user_id: friendship.other(viewer),
            status: friendship.status,
            outgoing: friendship.requester_id == viewer,
            created_at: friendship.created_at,
            accepted_at: friendship.accepted_at,
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub message_type: ContentType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_size: Option<i64>,
    #[serde(default)]
    pub media_duration: Option<f64>,
    /// Seconds after the first view at which the content disappears.
    #[serde(default)]
    pub disappear_after: Option<i64>,
}

/// A message as shown to either participant.
///
/// Metadata is always present. Content fields are `None` once the message is
/// deleted or expired, regardless of what is still stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub message_type: ContentType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_size: Option<i64>,
    pub media_duration: Option<f64>,
    pub disappear_after: Option<i64>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn redacted(message: &Message, now: DateTime<Utc>) -> Self {
        let visible = message.content_visible_at(now);
        let reveal = |value: &Option<String>| if visible { value.clone() } else { None };

        Self {
            id: message.id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            message_type: message.message_type,
            content: reveal(&message.content),
            media_url: reveal(&message.media_url),
            media_size: message.media_size.filter(|_| visible),
            media_duration: message.media_duration.filter(|_| visible),
            disappear_after: message.disappear_after_secs,
            is_delivered: message.is_delivered,
            delivered_at: message.delivered_at,
            is_viewed: message.is_viewed,
            viewed_at: message.viewed_at,
            is_deleted: message.is_deleted,
            is_expired: message.is_expired_at(now),
            expires_at: message.expires_at,
            created_at: message.created_at,
        }
    }
}

// -- Stories --

/// Privacy level and content type arrive as free strings so that unknown
/// values can be rejected with a 400 rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub content_type: String,
    pub media_url: String,
    #[serde(default)]
    pub media_size: i64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default = "default_privacy_level")]
    pub privacy_level: String,
}

fn default_privacy_level() -> String {
    "friends".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryResponse {
    #[serde(flatten)]
    pub story: Story,
    pub view_count: u64,
    pub has_viewed: bool,
    pub is_expired: bool,
    pub time_remaining_secs: i64,
}

impl StoryResponse {
    pub fn new(story: Story, view_count: u64, has_viewed: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_expired: story.is_expired_at(now),
            time_remaining_secs: story.time_remaining_at(now).num_seconds(),
            story,
            view_count,
            has_viewed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewStoryResponse {
    /// False when the owner viewed their own story.
    pub recorded: bool,
    pub view_count: u64,
}
