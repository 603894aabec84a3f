use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};
use uuid::Uuid;

use verdant_db::Database;
use verdant_gateway::{Gateway, Heartbeat, IdentityResolver};
use verdant_lifecycle::{Clock, FriendshipGate, MessageService, StoryService};
use verdant_presence::Registry;
use verdant_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub registry: Registry,
    pub friends: FriendshipGate,
    pub messages: MessageService,
    pub stories: StoryService,
    pub gateway: Gateway,
    pub identity: IdentityResolver,
    pub clock: Arc<dyn Clock>,
}

impl AppStateInner {
    /// Wire every service around one database, registry and clock.
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        identity: IdentityResolver,
        heartbeat: Heartbeat,
    ) -> AppState {
        let registry = Registry::new();
        let friends = FriendshipGate::new(db.clone(), clock.clone());
        let messages =
            MessageService::new(db.clone(), registry.clone(), friends.clone(), clock.clone());
        let stories = StoryService::new(db.clone(), friends.clone(), clock.clone());
        let gateway = Gateway::new(registry.clone(), messages.clone(), identity.clone())
            .with_heartbeat(heartbeat);

        Arc::new(Self {
            db,
            registry,
            friends,
            messages,
            stories,
            gateway,
            identity,
            clock,
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim().to_string();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::bad_request("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("password hashing failed: {}", e);
            ApiError::internal()
        })?
        .to_string();

    let user_id = Uuid::new_v4();
    let now = state.clock.now();

    let db = state.db.clone();
    let name = username.clone();
    let created = tokio::task::spawn_blocking(move || {
        db.create_user(user_id, &name, &password_hash, now)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::internal()
    })??;

    if !created {
        return Err(ApiError::conflict("username is taken"));
    }

    let token = state.identity.issue(user_id, &username).map_err(|e| {
        error!("token signing failed: {}", e);
        ApiError::internal()
    })?;

    info!("Registered {} ({})", username, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let username = req.username.trim().to_string();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_username(&username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })??
        .ok_or_else(|| ApiError::unauthorized("invalid username or password"))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("stored hash for {} is unreadable: {}", user.username, e);
        ApiError::internal()
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::unauthorized("invalid username or password"))?;

    let user_id = user.user_id()?;
    let token = state.identity.issue(user_id, &user.username).map_err(|e| {
        error!("token signing failed: {}", e);
        ApiError::internal()
    })?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}
