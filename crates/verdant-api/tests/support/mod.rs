#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use verdant_api::{AppState, AppStateInner, router};
use verdant_db::Database;
use verdant_gateway::{Heartbeat, IdentityResolver};
use verdant_lifecycle::ManualClock;

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub router: Router,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

pub fn build_app() -> TestApp {
    build_app_with_heartbeat(Heartbeat::default())
}

pub fn build_app_with_heartbeat(heartbeat: Heartbeat) -> TestApp {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    let clock = Arc::new(ManualClock::new(start()));
    let identity = IdentityResolver::new("integration-secret", Duration::days(1));
    let state = AppStateInner::new(db, clock.clone(), identity, heartbeat);
    TestApp {
        router: router(state.clone()),
        state,
        clock,
    }
}

impl TestApp {
    /// Insert a user directly and issue a token, skipping password hashing.
    pub fn user(&self, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        assert!(
            self.state
                .db
                .create_user(id, name, "unused-hash", start())
                .expect("create user")
        );
        let token = self.state.identity.issue(id, name).expect("issue token");
        (id, token)
    }

    pub fn befriend(&self, a: Uuid, b: Uuid) {
        self.state
            .db
            .insert_friend_request(a, b, start())
            .expect("friend request");
        assert!(self.state.db.accept_friend_request(a, b, start()).expect("accept"));
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }
}
