pub use hub::{HubSubscription, Publisher, RealtimeHub};

pub mod hub;
pub mod wire;
