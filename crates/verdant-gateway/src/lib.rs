pub mod connection;
pub mod dispatcher;
pub mod identity;

pub use connection::Heartbeat;
pub use dispatcher::Gateway;
pub use identity::{AuthError, IdentityResolver};
