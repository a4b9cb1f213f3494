use std::{error::Error, fmt};

use async_trait::async_trait;
use model::{
    delivery::Delivery,
    realtime::{ChannelEvent, ConnectionState},
};
use utility::id::Id;

#[derive(Debug)]
pub enum ChannelError {
    /// The channel is gone for good.
    Closed,
    /// Already subscribed to another delivery.
    AlreadyJoined(Id<Delivery>),
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "real-time channel is closed"),
            Self::AlreadyJoined(id) => write!(f, "already joined delivery {}", id),
            Self::Other(why) => write!(f, "real-time channel failed: {}", why),
        }
    }
}

impl Error for ChannelError {}

/// Push channel delivering the events of one delivery.
///
/// Events may arrive more than once; consumers keep the latest value.
#[async_trait]
pub trait UpdateChannel: Send + 'static {
    /// Restricts the subscription to the events of `delivery_id`.
    async fn join(&mut self, delivery_id: Id<Delivery>) -> Result<(), ChannelError>;

    /// The next event of the joined delivery. `None` once the channel closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    fn connection_state(&self) -> ConnectionState;

    /// Ends the subscription. Does nothing if it already ended.
    async fn leave(&mut self);
}
