pub mod auth;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod stories;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
