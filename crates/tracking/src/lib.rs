use std::{error::Error, fmt};

use actors::actor::ActorError;
use channel::ChannelError;

pub mod channel;
pub mod config;
pub mod geolocation;
pub mod map;
pub mod provider;
pub mod route;
pub mod session;
pub mod tracker;

#[derive(Debug)]
pub enum TrackingError {
    /// The session was stopped or the delivery finished.
    Closed,
    NoPositionProvider,
    Channel(ChannelError),
    Tracker(ActorError),
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "tracking session is closed"),
            Self::NoPositionProvider => {
                write!(f, "tracking session has no position provider")
            }
            Self::Channel(why) => write!(f, "{}", why),
            Self::Tracker(why) => write!(f, "tracker failed: {}", why),
        }
    }
}

impl Error for TrackingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Channel(why) => Some(why),
            Self::Tracker(why) => Some(why),
            _ => None,
        }
    }
}

impl From<ChannelError> for TrackingError {
    fn from(why: ChannelError) -> Self {
        Self::Channel(why)
    }
}

impl From<ActorError> for TrackingError {
    fn from(why: ActorError) -> Self {
        match why {
            ActorError::Stopped => Self::Closed,
            why => Self::Tracker(why),
        }
    }
}

pub type TrackingResult<O> = Result<O, TrackingError>;
