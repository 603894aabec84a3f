use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use verdant_gateway::connection;

use crate::auth::{self, AppState};
use crate::middleware::{bearer_token, require_auth};
use crate::{friends, messages, stories};

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub online: usize,
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/friends", get(friends::list_friends))
        .route("/friends/online", get(friends::online_friends))
        .route("/friends/{user_id}", post(friends::send_request))
        .route("/friends/{user_id}/accept", post(friends::accept_request))
        .route("/friends/{user_id}/close", put(friends::set_close_friend))
        .route("/messages", post(messages::send_message))
        .route(
            "/messages/conversation/{user_id}",
            get(messages::get_conversation),
        )
        .route(
            "/messages/{message_id}",
            get(messages::get_message).delete(messages::delete_message),
        )
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route("/stories", post(stories::create_story))
        .route("/stories/feed", get(stories::feed))
        .route("/stories/archive", get(stories::archived))
        .route("/stories/user/{user_id}", get(stories::user_stories))
        .route(
            "/stories/{story_id}",
            get(stories::get_story).delete(stories::delete_story),
        )
        .route("/stories/{story_id}/view", post(stories::view_story))
        .route("/stories/{story_id}/views", get(stories::story_views))
        .route("/stories/{story_id}/archive", post(stories::archive_story))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Authenticates inside the upgraded socket so failures get a close code
    let ws_route = Router::new().route("/gateway", get(gateway_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        online: state.registry.online_count().await,
    })
}

async fn gateway_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query.token.or_else(|| bearer_token(&headers));
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, token))
}
