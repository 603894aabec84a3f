use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use verdant_db::Database;
use verdant_presence::Registry;
use verdant_types::api::{MessageResponse, SendMessageRequest};
use verdant_types::events::GatewayEvent;
use verdant_types::models::{ContentType, Message};

use crate::blocking;
use crate::clock::Clock;
use crate::error::{LifecycleError, Result};
use crate::friendship::FriendshipGate;

pub const MAX_CONTENT_CHARS: usize = 4000;

/// Longest allowed disappear-after window: one week.
pub const MAX_DISAPPEAR_AFTER_SECS: i64 = 7 * 24 * 60 * 60;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// What a sender supplies for a new message.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub message_type: ContentType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_size: Option<i64>,
    pub media_duration: Option<f64>,
    pub disappear_after_secs: Option<i64>,
}

impl From<SendMessageRequest> for NewMessage {
    fn from(req: SendMessageRequest) -> Self {
        Self {
            message_type: req.message_type,
            content: req.content,
            media_url: req.media_url,
            media_size: req.media_size,
            media_duration: req.media_duration,
            disappear_after_secs: req.disappear_after,
        }
    }
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let has_text = self.content.as_deref().is_some_and(|c| !c.trim().is_empty());
        let has_media = self.media_url.as_deref().is_some_and(|u| !u.trim().is_empty());

        if self.message_type.is_media() {
            if !has_media {
                return Err(LifecycleError::invalid(format!(
                    "{} messages need a media_url",
                    self.message_type
                )));
            }
        } else if !has_text {
            return Err(LifecycleError::invalid("text messages need content"));
        }

        if self
            .content
            .as_deref()
            .is_some_and(|c| c.chars().count() > MAX_CONTENT_CHARS)
        {
            return Err(LifecycleError::invalid(format!(
                "content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        if self.media_size.is_some_and(|size| size < 0)
            || self.media_duration.is_some_and(|d| d < 0.0)
        {
            return Err(LifecycleError::invalid("media size and duration must be non-negative"));
        }
        if let Some(secs) = self.disappear_after_secs {
            if secs <= 0 || secs > MAX_DISAPPEAR_AFTER_SECS {
                return Err(LifecycleError::invalid(format!(
                    "disappear_after must be between 1 and {} seconds",
                    MAX_DISAPPEAR_AFTER_SECS
                )));
            }
        }
        Ok(())
    }
}

/// Direct message state machine: created, delivered, viewed, then expired or
/// deleted. Expiry is never swept; every read checks it against the clock.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
    registry: Registry,
    friends: FriendshipGate,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    pub fn new(
        db: Arc<Database>,
        registry: Registry,
        friends: FriendshipGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            registry,
            friends,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist a message to a friend, then push it to the recipient if they
    /// are connected. Being offline is not an error; the message is fetched
    /// later through the conversation.
    pub async fn send(&self, sender: Uuid, recipient: Uuid, new: NewMessage) -> Result<Message> {
        new.validate()?;
        if sender == recipient {
            return Err(LifecycleError::invalid("cannot message yourself"));
        }

        let db = self.db.clone();
        if !blocking(move || Ok(db.user_exists(recipient)?)).await? {
            return Err(LifecycleError::NotFound("recipient"));
        }
        self.friends.ensure_friends(sender, recipient).await?;

        let now = self.clock.now();
        let mut message = Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            message_type: new.message_type,
            content: new.content,
            media_url: new.media_url,
            media_size: new.media_size,
            media_duration: new.media_duration,
            disappear_after_secs: new.disappear_after_secs,
            is_delivered: false,
            delivered_at: None,
            is_viewed: false,
            viewed_at: None,
            is_deleted: false,
            deleted_at: None,
            expires_at: None,
            created_at: now,
        };

        let db = self.db.clone();
        let row = message.clone();
        blocking(move || Ok(db.insert_message(&row)?)).await?;
        info!(
            "Message {} stored ({} from {} to {})",
            message.id, message.message_type, sender, recipient
        );

        // The pushed copy must already carry the delivered state the sender
        // will see in its echo.
        message.is_delivered = true;
        message.delivered_at = Some(now);
        let pushed = self
            .registry
            .send(
                recipient,
                GatewayEvent::NewMessage {
                    message: MessageResponse::redacted(&message, now),
                },
            )
            .await;

        if pushed {
            let db = self.db.clone();
            let id = message.id;
            blocking(move || Ok(db.mark_message_delivered(id, now)?)).await?;
        } else {
            message.is_delivered = false;
            message.delivered_at = None;
            debug!("Recipient {} offline, message {} left undelivered", recipient, message.id);
        }

        Ok(message)
    }

    /// A single message, visible to its two participants only.
    pub async fn get(&self, message_id: Uuid, requester: Uuid) -> Result<Message> {
        let message = self.load(message_id).await?;
        if !message.involves(requester) {
            return Err(LifecycleError::NotFound("message"));
        }
        Ok(message)
    }

    /// Record that the recipient has seen the message.
    ///
    /// Idempotent. On the first view of a disappearing message this is where
    /// `expires_at` gets its one and only value, and the sender gets a read
    /// receipt.
    pub async fn mark_viewed(&self, message_id: Uuid, viewer: Uuid) -> Result<Message> {
        let message = self.load(message_id).await?;
        if message.recipient_id != viewer {
            return Err(LifecycleError::denied(
                "only the recipient can mark a message as read",
            ));
        }
        if message.is_viewed {
            return Ok(message);
        }

        let now = self.clock.now();
        let expires_at = message
            .disappear_after_secs
            .map(|secs| now + Duration::seconds(secs));

        let db = self.db.clone();
        let first_view = blocking(move || Ok(db.mark_message_viewed(message_id, now, expires_at)?)).await?;
        let message = self.load(message_id).await?;

        if first_view {
            info!("Message {} viewed by {}", message_id, viewer);
            self.registry
                .send(
                    message.sender_id,
                    GatewayEvent::MessageRead {
                        message_id,
                        read_by: viewer,
                    },
                )
                .await;
        }

        Ok(message)
    }

    /// Sender-only soft delete. The row and its metadata stay; content is
    /// hidden from every read path.
    pub async fn soft_delete(&self, message_id: Uuid, requester: Uuid) -> Result<Message> {
        let message = self.load(message_id).await?;
        if message.sender_id != requester {
            return Err(LifecycleError::denied("only the sender can delete a message"));
        }

        let now = self.clock.now();
        let db = self.db.clone();
        let deleted = blocking(move || Ok(db.soft_delete_message(message_id, now)?)).await?;
        let message = self.load(message_id).await?;

        if deleted {
            info!("Message {} deleted by sender {}", message_id, requester);
            self.registry
                .send(message.recipient_id, GatewayEvent::MessageDeleted { message_id })
                .await;
        }

        Ok(message)
    }

    /// Messages between `user` and `other`, oldest first. Anything `other`
    /// sent that `user` had not yet received counts as delivered now.
    pub async fn conversation(
        &self,
        user: Uuid,
        other: Uuid,
        limit: Option<u32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.friends.ensure_friends(user, other).await?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let now = self.clock.now();
        let db = self.db.clone();
        blocking(move || {
            db.mark_conversation_delivered(user, other, now)?;
            Ok(db.get_conversation(user, other, limit, before)?)
        })
        .await
    }

    /// Whether the message's content is hidden by expiry right now.
    pub fn is_expired(&self, message: &Message) -> bool {
        message.is_expired_at(self.clock.now())
    }

    async fn load(&self, message_id: Uuid) -> Result<Message> {
        let db = self.db.clone();
        blocking(move || db.get_message(message_id)?.ok_or(LifecycleError::NotFound("message"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{befriend, setup, t0, user};
    use verdant_presence::{Channel, ChannelReceiver, Outbound};

    struct Fixture {
        db: Arc<Database>,
        clock: Arc<ManualClock>,
        registry: Registry,
        service: MessageService,
        alice: Uuid,
        bob: Uuid,
        carol: Uuid,
    }

    fn fixture() -> Fixture {
        let (db, clock) = setup();
        let registry = Registry::new();
        let friends = FriendshipGate::new(db.clone(), clock.clone());
        let service = MessageService::new(db.clone(), registry.clone(), friends, clock.clone());
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        befriend(&db, alice, bob);
        Fixture {
            db,
            clock,
            registry,
            service,
            alice,
            bob,
            carol,
        }
    }

    async fn connect(registry: &Registry, user_id: Uuid) -> ChannelReceiver {
        let (channel, mut rx) = Channel::open();
        registry.connect(user_id, channel).await;
        // connection_established
        rx.recv().await.unwrap();
        rx
    }

    fn disappearing(secs: i64) -> NewMessage {
        NewMessage {
            disappear_after_secs: Some(secs),
            ..NewMessage::text("this will vanish")
        }
    }

    #[tokio::test]
    async fn friends_can_message_and_both_see_content() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, NewMessage::text("hi")).await.unwrap();
        assert_eq!(msg.sender_id, f.alice);

        for viewer in [f.alice, f.bob] {
            let stored = f.service.get(msg.id, viewer).await.unwrap();
            let view = MessageResponse::redacted(&stored, f.service.now());
            assert_eq!(view.content.as_deref(), Some("hi"));
        }
    }

    #[tokio::test]
    async fn strangers_are_rejected_and_nothing_is_stored() {
        let f = fixture();
        let err = f
            .service
            .send(f.alice, f.carol, NewMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PermissionDenied(_)));

        f.db.insert_friend_request(f.alice, f.carol, t0()).unwrap();
        f.db.accept_friend_request(f.alice, f.carol, t0()).unwrap();
        let convo = f.service.conversation(f.alice, f.carol, None, None).await.unwrap();
        assert!(convo.is_empty());
    }

    #[tokio::test]
    async fn invalid_content_is_rejected() {
        let f = fixture();
        let cases = [
            NewMessage::text("   "),
            NewMessage {
                message_type: ContentType::Image,
                ..Default::default()
            },
            disappearing(0),
        ];
        for new in cases {
            assert!(matches!(
                f.service.send(f.alice, f.bob, new).await,
                Err(LifecycleError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            f.service.send(f.alice, Uuid::new_v4(), NewMessage::text("hi")).await,
            Err(LifecycleError::NotFound("recipient"))
        ));
    }

    #[tokio::test]
    async fn online_recipient_gets_push_and_message_is_delivered() {
        let f = fixture();
        let mut rx = connect(&f.registry, f.bob).await;

        let msg = f.service.send(f.alice, f.bob, NewMessage::text("hi")).await.unwrap();
        assert!(msg.is_delivered);

        match rx.recv().await.unwrap() {
            Outbound::Event(GatewayEvent::NewMessage { message }) => {
                assert_eq!(message.id, msg.id);
                assert_eq!(message.content.as_deref(), Some("hi"));
                assert!(message.is_delivered);
                assert_eq!(message.delivered_at, msg.delivered_at);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn offline_recipient_is_not_an_error() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, NewMessage::text("hi")).await.unwrap();
        assert!(!msg.is_delivered);
        assert!(msg.delivered_at.is_none());

        // Fetching the conversation delivers it.
        let convo = f.service.conversation(f.bob, f.alice, None, None).await.unwrap();
        assert_eq!(convo.len(), 1);
        assert!(convo[0].is_delivered);
    }

    #[tokio::test]
    async fn first_view_sets_expiry_once() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, disappearing(30)).await.unwrap();
        assert!(msg.expires_at.is_none());

        f.clock.advance(Duration::minutes(5));
        let view_time = f.clock.now();
        let viewed = f.service.mark_viewed(msg.id, f.bob).await.unwrap();
        assert!(viewed.is_viewed);
        assert_eq!(viewed.expires_at, Some(view_time + Duration::seconds(30)));

        f.clock.advance(Duration::seconds(10));
        let again = f.service.mark_viewed(msg.id, f.bob).await.unwrap();
        assert_eq!(again.expires_at, viewed.expires_at);
        assert_eq!(again.viewed_at, viewed.viewed_at);
    }

    #[tokio::test]
    async fn expiry_boundary_hides_content() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, disappearing(30)).await.unwrap();
        let viewed = f.service.mark_viewed(msg.id, f.bob).await.unwrap();
        let expires_at = viewed.expires_at.unwrap();

        f.clock.set(expires_at - Duration::seconds(1));
        assert!(!f.service.is_expired(&viewed));
        let view = MessageResponse::redacted(&viewed, f.clock.now());
        assert!(view.content.is_some());

        f.clock.set(expires_at);
        assert!(f.service.is_expired(&viewed));

        let stored = f.service.get(msg.id, f.alice).await.unwrap();
        let view = MessageResponse::redacted(&stored, f.clock.now());
        assert!(view.content.is_none());
        assert!(view.is_expired && view.is_viewed);
    }

    #[tokio::test]
    async fn only_recipient_marks_viewed() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, NewMessage::text("hi")).await.unwrap();
        assert!(matches!(
            f.service.mark_viewed(msg.id, f.alice).await,
            Err(LifecycleError::PermissionDenied(_))
        ));
        assert!(matches!(
            f.service.mark_viewed(Uuid::new_v4(), f.bob).await,
            Err(LifecycleError::NotFound("message"))
        ));
    }

    #[tokio::test]
    async fn sender_gets_receipt_on_first_view_only() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, NewMessage::text("hi")).await.unwrap();
        let mut rx = connect(&f.registry, f.alice).await;

        f.service.mark_viewed(msg.id, f.bob).await.unwrap();
        f.service.mark_viewed(msg.id, f.bob).await.unwrap();

        match rx.recv().await.unwrap() {
            Outbound::Event(GatewayEvent::MessageRead { message_id, read_by }) => {
                assert_eq!(message_id, msg.id);
                assert_eq!(read_by, f.bob);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn soft_delete_keeps_metadata() {
        let f = fixture();
        let msg = f.service.send(f.alice, f.bob, NewMessage::text("oops")).await.unwrap();

        assert!(matches!(
            f.service.soft_delete(msg.id, f.bob).await,
            Err(LifecycleError::PermissionDenied(_))
        ));

        let deleted = f.service.soft_delete(msg.id, f.alice).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());

        let view = MessageResponse::redacted(&deleted, f.service.now());
        assert!(view.content.is_none());
        assert_eq!(view.sender_id, f.alice);

        // Idempotent
        let again = f.service.soft_delete(msg.id, f.alice).await.unwrap();
        assert_eq!(again.deleted_at, deleted.deleted_at);
    }
}
