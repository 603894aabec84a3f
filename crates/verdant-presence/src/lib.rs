pub mod channel;
pub mod registry;

pub use channel::{Channel, ChannelReceiver, Outbound, Replier};
pub use registry::Registry;
