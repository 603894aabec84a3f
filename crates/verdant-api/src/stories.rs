use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use verdant_types::api::{Claims, CreateStoryRequest, StoryResponse, ViewStoryResponse};
use verdant_types::models::StoryView;

use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let story = state.stories.create(claims.sub, req).await?;
    let summary = state.stories.summary(story, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<StoryResponse>>> {
    let stories = state.stories.feed(claims.sub).await?;
    Ok(Json(state.stories.summaries(stories, claims.sub).await?))
}

pub async fn user_stories(
    State(state): State<AppState>,
    Path(owner): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<StoryResponse>>> {
    let stories = state.stories.get_visible(owner, claims.sub).await?;
    Ok(Json(state.stories.summaries(stories, claims.sub).await?))
}

pub async fn archived(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<StoryResponse>>> {
    let stories = state.stories.archived(claims.sub).await?;
    Ok(Json(state.stories.summaries(stories, claims.sub).await?))
}

pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StoryResponse>> {
    let story = state.stories.story(story_id, claims.sub).await?;
    Ok(Json(state.stories.summary(story, claims.sub).await?))
}

pub async fn view_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ViewStoryResponse>> {
    Ok(Json(state.stories.view(story_id, claims.sub).await?))
}

pub async fn story_views(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<StoryView>>> {
    Ok(Json(state.stories.views(story_id, claims.sub).await?))
}

pub async fn archive_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StoryResponse>> {
    let story = state.stories.archive(story_id, claims.sub).await?;
    Ok(Json(state.stories.summary(story, claims.sub).await?))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    state.stories.deactivate(story_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
