use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use verdant_lifecycle::{LifecycleError, MessageService, NewMessage};
use verdant_presence::{Registry, Replier};
use verdant_types::api::MessageResponse;
use verdant_types::events::{
    GatewayCommand, GatewayEvent, MessageReadPayload, SendMessagePayload, TypingPayload,
};

use crate::connection::Heartbeat;
use crate::identity::IdentityResolver;

/// Shared context for every realtime connection. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Registry,
    pub messages: MessageService,
    pub identity: IdentityResolver,
    pub heartbeat: Heartbeat,
}

impl Gateway {
    pub fn new(registry: Registry, messages: MessageService, identity: IdentityResolver) -> Self {
        Self {
            registry,
            messages,
            identity,
            heartbeat: Heartbeat::default(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Handle one inbound text frame from `user_id`.
    ///
    /// Every failure is reported back on `reply` as an `error` envelope. No
    /// input closes the channel from here.
    pub async fn handle_frame(&self, user_id: Uuid, reply: &Replier, text: &str) {
        match GatewayCommand::decode(text) {
            Ok(cmd) => self.handle_command(user_id, reply, cmd).await,
            Err(e) => {
                warn!(
                    "{} bad frame: {} -- raw: {}",
                    user_id,
                    e,
                    truncate(text, 200)
                );
                reply.send(GatewayEvent::error(format!("malformed frame: {}", e)));
            }
        }
    }

    async fn handle_command(&self, user_id: Uuid, reply: &Replier, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::SendMessage(payload) => self.send_message(user_id, reply, payload).await,

            GatewayCommand::TypingStart(payload) => {
                self.typing(user_id, reply, payload, true).await
            }

            GatewayCommand::TypingStop(payload) => {
                self.typing(user_id, reply, payload, false).await
            }

            GatewayCommand::MessageRead(payload) => self.message_read(user_id, reply, payload).await,

            GatewayCommand::Ping => {
                reply.send(GatewayEvent::Pong {
                    timestamp: Utc::now(),
                });
            }

            GatewayCommand::Unknown { kind } => {
                debug!("{} sent unknown frame type {:?}", user_id, kind);
                reply.send(GatewayEvent::error(format!("unknown message type: {}", kind)));
            }
        }
    }

    async fn send_message(&self, sender: Uuid, reply: &Replier, payload: SendMessagePayload) {
        let Some(recipient) = payload.recipient_id else {
            reply.send(GatewayEvent::error("recipient_id is required"));
            return;
        };
        let has_content = payload.content.as_deref().is_some_and(|c| !c.trim().is_empty())
            || payload.media_url.as_deref().is_some_and(|u| !u.trim().is_empty());
        if !has_content {
            reply.send(GatewayEvent::error("content or media_url is required"));
            return;
        }

        let new = NewMessage {
            message_type: payload.message_type.unwrap_or_default(),
            content: payload.content,
            media_url: payload.media_url,
            media_size: payload.media_size,
            media_duration: payload.media_duration,
            disappear_after_secs: payload.disappear_after,
        };

        match self.messages.send(sender, recipient, new).await {
            Ok(message) => {
                let message = MessageResponse::redacted(&message, self.messages.now());
                reply.send(GatewayEvent::MessageSent { message });
            }
            Err(e) => reject(sender, reply, "send_message", e),
        }
    }

    async fn typing(&self, user_id: Uuid, reply: &Replier, payload: TypingPayload, is_typing: bool) {
        let Some(recipient) = payload.recipient_id else {
            reply.send(GatewayEvent::error("recipient_id is required"));
            return;
        };
        // Offline recipients are ignored.
        self.registry
            .send(recipient, GatewayEvent::TypingIndicator { user_id, is_typing })
            .await;
    }

    async fn message_read(&self, viewer: Uuid, reply: &Replier, payload: MessageReadPayload) {
        let Some(message_id) = payload.message_id else {
            reply.send(GatewayEvent::error("message_id is required"));
            return;
        };
        if let Err(e) = self.messages.mark_viewed(message_id, viewer).await {
            reject(viewer, reply, "message_read", e);
        }
    }
}

fn reject(user_id: Uuid, reply: &Replier, kind: &str, err: LifecycleError) {
    match &err {
        LifecycleError::Storage(e) => warn!("{} {} failed: {:#}", user_id, kind, e),
        _ => info!("{} {} rejected: {}", user_id, kind, err),
    }
    let message = match err {
        LifecycleError::Storage(_) => "internal error".to_string(),
        other => other.to_string(),
    };
    reply.send(GatewayEvent::error(message));
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use verdant_db::Database;
    use verdant_lifecycle::{FriendshipGate, ManualClock};
    use verdant_presence::{Channel, ChannelReceiver, Outbound};

    use super::*;

    struct Fixture {
        db: Arc<Database>,
        gateway: Gateway,
        alice: Uuid,
        bob: Uuid,
        carol: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()));
        let registry = Registry::new();
        let friends = FriendshipGate::new(db.clone(), clock.clone());
        let messages = MessageService::new(db.clone(), registry.clone(), friends, clock);
        let identity = IdentityResolver::new("test-secret", Duration::days(1));

        let mut users = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let id = Uuid::new_v4();
            db.create_user(id, name, "hash", Utc::now()).unwrap();
            users.push(id);
        }
        db.insert_friend_request(users[0], users[1], Utc::now()).unwrap();
        db.accept_friend_request(users[0], users[1], Utc::now()).unwrap();

        Fixture {
            db,
            gateway: Gateway::new(registry, messages, identity),
            alice: users[0],
            bob: users[1],
            carol: users[2],
        }
    }

    async fn connect(gateway: &Gateway, user_id: Uuid) -> (Replier, ChannelReceiver) {
        let (channel, mut rx) = Channel::open();
        let replier = channel.replier();
        gateway.registry.connect(user_id, channel).await;
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Event(GatewayEvent::ConnectionEstablished { .. }))
        ));
        (replier, rx)
    }

    fn next_event(rx: &mut ChannelReceiver) -> GatewayEvent {
        match rx.try_recv() {
            Ok(Outbound::Event(event)) => event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    fn assert_error(rx: &mut ChannelReceiver) -> String {
        match next_event(rx) {
            GatewayEvent::Error { message } => message,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let f = fixture();
        let (reply, mut rx) = connect(&f.gateway, f.alice).await;

        f.gateway.handle_frame(f.alice, &reply, r#"{"type":"ping"}"#).await;
        assert!(matches!(next_event(&mut rx), GatewayEvent::Pong { .. }));
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_get_errors() {
        let f = fixture();
        let (reply, mut rx) = connect(&f.gateway, f.alice).await;

        f.gateway.handle_frame(f.alice, &reply, "{not json").await;
        assert!(assert_error(&mut rx).contains("malformed"));

        f.gateway
            .handle_frame(f.alice, &reply, r#"{"type":"water_plant"}"#)
            .await;
        assert!(assert_error(&mut rx).contains("water_plant"));

        // Still usable afterwards.
        f.gateway.handle_frame(f.alice, &reply, r#"{"type":"ping"}"#).await;
        assert!(matches!(next_event(&mut rx), GatewayEvent::Pong { .. }));
    }

    #[tokio::test]
    async fn send_message_echoes_and_pushes() {
        let f = fixture();
        let (reply, mut alice_rx) = connect(&f.gateway, f.alice).await;
        let (_bob_reply, mut bob_rx) = connect(&f.gateway, f.bob).await;

        let frame = format!(
            r#"{{"type":"send_message","recipient_id":"{}","content":"hello"}}"#,
            f.bob
        );
        f.gateway.handle_frame(f.alice, &reply, &frame).await;

        let pushed = match next_event(&mut bob_rx) {
            GatewayEvent::NewMessage { message } => message,
            other => panic!("unexpected {:?}", other),
        };
        let echoed = match next_event(&mut alice_rx) {
            GatewayEvent::MessageSent { message } => message,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(pushed.id, echoed.id);
        assert_eq!(echoed.content.as_deref(), Some("hello"));
        assert!(echoed.is_delivered);
    }

    #[tokio::test]
    async fn send_message_to_stranger_is_rejected_without_push() {
        let f = fixture();
        let (reply, mut alice_rx) = connect(&f.gateway, f.alice).await;
        let (_carol_reply, mut carol_rx) = connect(&f.gateway, f.carol).await;

        let frame = format!(
            r#"{{"type":"send_message","recipient_id":"{}","content":"hello"}}"#,
            f.carol
        );
        f.gateway.handle_frame(f.alice, &reply, &frame).await;

        assert!(assert_error(&mut alice_rx).contains("not friends"));
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_message_requires_recipient_and_content() {
        let f = fixture();
        let (reply, mut rx) = connect(&f.gateway, f.alice).await;

        f.gateway
            .handle_frame(f.alice, &reply, r#"{"type":"send_message","content":"hi"}"#)
            .await;
        assert!(assert_error(&mut rx).contains("recipient_id"));

        let frame = format!(r#"{{"type":"send_message","recipient_id":"{}"}}"#, f.bob);
        f.gateway.handle_frame(f.alice, &reply, &frame).await;
        assert!(assert_error(&mut rx).contains("content"));
    }

    #[tokio::test]
    async fn typing_is_forwarded_to_online_recipient() {
        let f = fixture();
        let (reply, mut alice_rx) = connect(&f.gateway, f.alice).await;
        let (_bob_reply, mut bob_rx) = connect(&f.gateway, f.bob).await;

        let frame = format!(r#"{{"type":"typing_start","recipient_id":"{}"}}"#, f.bob);
        f.gateway.handle_frame(f.alice, &reply, &frame).await;
        match next_event(&mut bob_rx) {
            GatewayEvent::TypingIndicator { user_id, is_typing } => {
                assert_eq!(user_id, f.alice);
                assert!(is_typing);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Offline recipient: nothing comes back to the sender.
        let frame = format!(r#"{{"type":"typing_stop","recipient_id":"{}"}}"#, f.carol);
        f.gateway.handle_frame(f.alice, &reply, &frame).await;
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_read_marks_viewed_and_notifies_stored_sender() {
        let f = fixture();
        let message = f
            .gateway
            .messages
            .send(f.alice, f.bob, NewMessage::text("hi"))
            .await
            .unwrap();

        let (_alice_reply, mut alice_rx) = connect(&f.gateway, f.alice).await;
        let (bob_reply, _bob_rx) = connect(&f.gateway, f.bob).await;

        // A bogus sender_id in the payload is ignored.
        let frame = format!(
            r#"{{"type":"message_read","message_id":"{}","sender_id":"{}"}}"#,
            message.id, f.carol
        );
        f.gateway.handle_frame(f.bob, &bob_reply, &frame).await;

        match next_event(&mut alice_rx) {
            GatewayEvent::MessageRead { message_id, read_by } => {
                assert_eq!(message_id, message.id);
                assert_eq!(read_by, f.bob);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.db.get_message(message.id).unwrap().unwrap().is_viewed);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
