use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use verdant_db::Database;
use verdant_types::api::{CreateStoryRequest, StoryResponse, ViewStoryResponse};
use verdant_types::models::{PrivacyLevel, Story, StoryContentType, StoryView};

use crate::blocking;
use crate::clock::Clock;
use crate::error::{LifecycleError, Result};
use crate::friendship::{FriendshipGate, Relationship};

pub const MAX_CAPTION_CHARS: usize = 500;

/// Whether a story at `privacy` is visible to a non-owner with `rel`.
pub fn audience_allows(privacy: PrivacyLevel, rel: Relationship) -> bool {
    match privacy {
        PrivacyLevel::Public => true,
        PrivacyLevel::Friends => rel.friends,
        PrivacyLevel::CloseFriends => rel.friends && rel.close_friend,
    }
}

/// Posting, listing, viewing and archiving 24h stories.
///
/// Expiry is a read-time comparison against the clock. Nothing here depends
/// on whether the reaper has physically removed old rows yet.
#[derive(Clone)]
pub struct StoryService {
    db: Arc<Database>,
    friends: FriendshipGate,
    clock: Arc<dyn Clock>,
}

impl StoryService {
    pub fn new(db: Arc<Database>, friends: FriendshipGate, clock: Arc<dyn Clock>) -> Self {
        Self { db, friends, clock }
    }

    pub async fn create(&self, owner: Uuid, req: CreateStoryRequest) -> Result<Story> {
        let content_type: StoryContentType = req
            .content_type
            .parse()
            .map_err(|e| LifecycleError::invalid(format!("{}", e)))?;
        let privacy_level: PrivacyLevel = req
            .privacy_level
            .parse()
            .map_err(|e| LifecycleError::invalid(format!("{}", e)))?;

        if req.media_url.trim().is_empty() {
            return Err(LifecycleError::invalid("media_url is required"));
        }
        if req.media_size < 0 || req.duration < 0.0 {
            return Err(LifecycleError::invalid(
                "media_size and duration must be non-negative",
            ));
        }
        if req
            .caption
            .as_deref()
            .is_some_and(|c| c.chars().count() > MAX_CAPTION_CHARS)
        {
            return Err(LifecycleError::invalid(format!(
                "caption exceeds {} characters",
                MAX_CAPTION_CHARS
            )));
        }

        let now = self.clock.now();
        let story = Story {
            id: Uuid::new_v4(),
            owner_id: owner,
            content_type,
            media_url: req.media_url,
            media_size: req.media_size,
            duration_secs: req.duration,
            caption: req.caption,
            privacy_level,
            created_at: now,
            expires_at: Story::expiry_for(now),
            is_active: true,
            is_archived: false,
            archived_at: None,
        };

        let db = self.db.clone();
        let row = story.clone();
        blocking(move || Ok(db.insert_story(&row)?)).await?;

        info!(
            "Story {} posted by {} ({}, {})",
            story.id, owner, story.content_type.as_str(), story.privacy_level
        );
        Ok(story)
    }

    /// `owner`'s live stories that `viewer` may see, newest first.
    ///
    /// The owner skips the privacy check but still only sees live stories
    /// here; expired and archived ones are in `archived` and `story`.
    pub async fn get_visible(&self, owner: Uuid, viewer: Uuid) -> Result<Vec<Story>> {
        let now = self.clock.now();
        let rel = if owner == viewer {
            None
        } else {
            Some(self.friends.relationship(owner, viewer).await?)
        };

        let db = self.db.clone();
        let stories = blocking(move || Ok(db.get_stories_by_owner(owner)?)).await?;
        Ok(stories
            .into_iter()
            .filter(|story| story.is_live_at(now))
            .filter(|story| rel.is_none_or(|rel| audience_allows(story.privacy_level, rel)))
            .collect())
    }

    /// The viewer's own live stories plus every friend's stories visible to
    /// them, newest first.
    pub async fn feed(&self, viewer: Uuid) -> Result<Vec<Story>> {
        let mut stories = self.get_visible(viewer, viewer).await?;
        for friend in self.friends.friend_ids(viewer).await? {
            stories.extend(self.get_visible(friend, viewer).await?);
        }
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stories)
    }

    /// Story detail. Owners see any of their stories in any state; everyone
    /// else needs a live story whose audience includes them.
    pub async fn story(&self, story_id: Uuid, viewer: Uuid) -> Result<Story> {
        let story = self.load(story_id).await?;
        if story.owner_id != viewer {
            self.ensure_visible(&story, viewer).await?;
        }
        Ok(story)
    }

    /// Log a view. The owner looking at their own story records nothing.
    pub async fn view(&self, story_id: Uuid, viewer: Uuid) -> Result<ViewStoryResponse> {
        let story = self.load(story_id).await?;
        let db = self.db.clone();

        if story.owner_id == viewer {
            let view_count = blocking(move || Ok(db.count_story_views(story_id)?)).await?;
            return Ok(ViewStoryResponse {
                recorded: false,
                view_count,
            });
        }

        self.ensure_visible(&story, viewer).await?;

        let view = StoryView {
            id: Uuid::new_v4(),
            story_id,
            viewer_id: viewer,
            viewed_at: self.clock.now(),
        };
        let view_count = blocking(move || {
            db.insert_story_view(&view)?;
            Ok(db.count_story_views(story_id)?)
        })
        .await?;

        debug!("Story {} viewed by {} ({} views)", story_id, viewer, view_count);
        Ok(ViewStoryResponse {
            recorded: true,
            view_count,
        })
    }

    /// View log, owner only, newest first.
    pub async fn views(&self, story_id: Uuid, requester: Uuid) -> Result<Vec<StoryView>> {
        self.owned(story_id, requester).await?;
        let db = self.db.clone();
        blocking(move || Ok(db.get_story_views(story_id)?)).await
    }

    pub async fn archive(&self, story_id: Uuid, requester: Uuid) -> Result<Story> {
        self.owned(story_id, requester).await?;
        let now = self.clock.now();
        let db = self.db.clone();
        if blocking(move || Ok(db.archive_story(story_id, now)?)).await? {
            info!("Story {} archived by {}", story_id, requester);
        }
        self.load(story_id).await
    }

    /// Owner-only soft removal. The row stays for the reaper.
    pub async fn deactivate(&self, story_id: Uuid, requester: Uuid) -> Result<Story> {
        self.owned(story_id, requester).await?;
        let db = self.db.clone();
        if blocking(move || Ok(db.deactivate_story(story_id)?)).await? {
            info!("Story {} deactivated by {}", story_id, requester);
        }
        self.load(story_id).await
    }

    /// Owner's archived or expired stories that have not been deactivated.
    pub async fn archived(&self, owner: Uuid) -> Result<Vec<Story>> {
        let now = self.clock.now();
        let db = self.db.clone();
        let stories = blocking(move || Ok(db.get_stories_by_owner(owner)?)).await?;
        Ok(stories
            .into_iter()
            .filter(|story| story.is_active && (story.is_archived || story.is_expired_at(now)))
            .collect())
    }

    /// Attach view count, has-viewed and remaining time for `viewer`.
    pub async fn summaries(&self, stories: Vec<Story>, viewer: Uuid) -> Result<Vec<StoryResponse>> {
        let now = self.clock.now();
        let db = self.db.clone();
        blocking(move || {
            stories
                .into_iter()
                .map(|story| -> Result<StoryResponse> {
                    let view_count = db.count_story_views(story.id)?;
                    let has_viewed = db.has_viewed_story(story.id, viewer)?;
                    Ok(StoryResponse::new(story, view_count, has_viewed, now))
                })
                .collect()
        })
        .await
    }

    pub async fn summary(&self, story: Story, viewer: Uuid) -> Result<StoryResponse> {
        let mut summaries = self.summaries(vec![story], viewer).await?;
        summaries.pop().ok_or(LifecycleError::NotFound("story"))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn ensure_visible(&self, story: &Story, viewer: Uuid) -> Result<()> {
        if !story.is_live_at(self.clock.now()) {
            return Err(LifecycleError::NotFound("story"));
        }
        let rel = self.friends.relationship(story.owner_id, viewer).await?;
        if !audience_allows(story.privacy_level, rel) {
            return Err(LifecycleError::denied("this story is not shared with you"));
        }
        Ok(())
    }

    async fn owned(&self, story_id: Uuid, requester: Uuid) -> Result<Story> {
        let story = self.load(story_id).await?;
        if story.owner_id != requester {
            return Err(LifecycleError::denied("only the owner can do that"));
        }
        Ok(story)
    }

    async fn load(&self, story_id: Uuid) -> Result<Story> {
        let db = self.db.clone();
        blocking(move || db.get_story(story_id)?.ok_or(LifecycleError::NotFound("story"))).await
    }
}
