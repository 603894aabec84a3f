use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use verdant_types::api::{Claims, CloseFriendRequest, FriendResponse};

use crate::auth::AppState;
use crate::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct OnlineFriendsResponse {
    pub online: Vec<Uuid>,
}

pub async fn send_request(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let friendship = state.friends.request(claims.sub, user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(FriendResponse::from_friendship(&friendship, claims.sub)),
    ))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<FriendResponse>> {
    let friendship = state.friends.accept(claims.sub, user_id).await?;
    Ok(Json(FriendResponse::from_friendship(&friendship, claims.sub)))
}

pub async fn set_close_friend(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CloseFriendRequest>,
) -> ApiResult<StatusCode> {
    state
        .friends
        .set_close_friend(claims.sub, user_id, req.close_friend)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<FriendResponse>>> {
    let friendships = state.friends.list(claims.sub).await?;
    Ok(Json(
        friendships
            .iter()
            .map(|f| FriendResponse::from_friendship(f, claims.sub))
            .collect(),
    ))
}

/// Accepted friends with a live realtime channel.
pub async fn online_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<OnlineFriendsResponse>> {
    let friends = state.friends.friend_ids(claims.sub).await?;
    let online = state.registry.online_among(&friends).await;
    Ok(Json(OnlineFriendsResponse { online }))
}
