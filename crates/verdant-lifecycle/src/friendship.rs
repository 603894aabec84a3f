use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use verdant_db::{Database, FriendRequest};
use verdant_types::models::Friendship;

use crate::clock::Clock;
use crate::error::{LifecycleError, Result};
use crate::blocking;

/// How a story owner relates to a viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relationship {
    /// Accepted friendship in either direction.
    pub friends: bool,
    /// The owner has marked the viewer as a close friend.
    pub close_friend: bool,
}

/// Pairwise friendship and closeness lookups, plus the request/accept flow
/// that creates them.
#[derive(Clone)]
pub struct FriendshipGate {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl FriendshipGate {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let db = self.db.clone();
        blocking(move || {
            Ok(db
                .find_friendship(a, b)?
                .is_some_and(|friendship| friendship.is_accepted()))
        })
        .await
    }

    /// Fails with `PermissionDenied` unless `a` and `b` are accepted friends.
    pub async fn ensure_friends(&self, a: Uuid, b: Uuid) -> Result<()> {
        if self.are_friends(a, b).await? {
            Ok(())
        } else {
            Err(LifecycleError::denied("you are not friends with this user"))
        }
    }

    pub async fn relationship(&self, owner: Uuid, viewer: Uuid) -> Result<Relationship> {
        let db = self.db.clone();
        blocking(move || {
            let friends = db
                .find_friendship(owner, viewer)?
                .is_some_and(|friendship| friendship.is_accepted());
            let close_friend = friends && db.is_close_friend(owner, viewer)?;
            Ok(Relationship {
                friends,
                close_friend,
            })
        })
        .await
    }

    /// Ids of everyone `user_id` has an accepted friendship with.
    pub async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let db = self.db.clone();
        blocking(move || {
            Ok(db
                .list_friendships(user_id)?
                .into_iter()
                .filter(Friendship::is_accepted)
                .map(|friendship| friendship.other(user_id))
                .collect())
        })
        .await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Friendship>> {
        let db = self.db.clone();
        blocking(move || Ok(db.list_friendships(user_id)?)).await
    }

    /// Send a friend request. If `addressee` already asked `requester`, the
    /// pending request is accepted instead.
    pub async fn request(&self, requester: Uuid, addressee: Uuid) -> Result<Friendship> {
        if requester == addressee {
            return Err(LifecycleError::invalid("cannot befriend yourself"));
        }

        let db = self.db.clone();
        let now = self.clock.now();
        let friendship = blocking(move || {
            if !db.user_exists(addressee)? {
                return Err(LifecycleError::NotFound("user"));
            }

            match db.request_friendship(requester, addressee, now)? {
                FriendRequest::AlreadyFriends => {
                    return Err(LifecycleError::invalid("already friends"));
                }
                FriendRequest::AlreadyPending => {
                    return Err(LifecycleError::invalid("friend request already pending"));
                }
                FriendRequest::Created | FriendRequest::Accepted => {}
            }

            db.find_friendship(requester, addressee)?
                .ok_or(LifecycleError::NotFound("friendship"))
        })
        .await?;

        info!(
            "Friendship {} -> {} is now {}",
            requester,
            addressee,
            friendship.status.as_str()
        );
        Ok(friendship)
    }

    /// Accept the pending request `requester` sent to `user_id`.
    pub async fn accept(&self, user_id: Uuid, requester: Uuid) -> Result<Friendship> {
        let db = self.db.clone();
        let now = self.clock.now();
        let friendship = blocking(move || {
            if !db.accept_friend_request(requester, user_id, now)? {
                return Err(LifecycleError::NotFound("friend request"));
            }
            db.find_friendship(requester, user_id)?
                .ok_or(LifecycleError::NotFound("friendship"))
        })
        .await?;

        info!("{} accepted friend request from {}", user_id, requester);
        Ok(friendship)
    }

    /// Mark or unmark `friend` as one of `owner`'s close friends.
    pub async fn set_close_friend(&self, owner: Uuid, friend: Uuid, close: bool) -> Result<()> {
        self.ensure_friends(owner, friend).await?;
        let db = self.db.clone();
        let now = self.clock.now();
        blocking(move || Ok(db.set_close_friend(owner, friend, close, now)?)).await
    }
}
