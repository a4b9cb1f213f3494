//! JSON frames of the real-time socket.
//!
//! Every frame looks like `{"event": "<name>", "data": ...}`. Frames that
//! carry no `deliveryId` apply to the delivery the socket last joined.

use std::{error::Error, fmt};

use model::{
    coordinate::{Coordinate, CoordinateError},
    delivery::{Delivery, DeliveryStatus, ProductCollection},
    realtime::ChannelEvent,
};
use serde::Deserialize;
use utility::id::Id;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Join(Id<Delivery>),
    Event {
        delivery_id: Id<Delivery>,
        event: ChannelEvent,
    },
}

#[derive(Debug)]
pub enum WireError {
    Json(serde_json::Error),
    InvalidCoordinate(CoordinateError),
    /// The frame names no delivery and none was joined before.
    MissingDelivery,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(why) => write!(f, "malformed frame: {}", why),
            Self::InvalidCoordinate(why) => write!(f, "invalid location: {}", why),
            Self::MissingDelivery => write!(f, "frame does not name a delivery"),
        }
    }
}

impl Error for WireError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(why) => Some(why),
            Self::InvalidCoordinate(why) => Some(why),
            Self::MissingDelivery => None,
        }
    }
}

impl From<serde_json::Error> for WireError {
    fn from(why: serde_json::Error) -> Self {
        Self::Json(why)
    }
}

impl From<CoordinateError> for WireError {
    fn from(why: CoordinateError) -> Self {
        Self::InvalidCoordinate(why)
    }
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum RawFrame {
    JoinDelivery(JoinData),
    DeliveryLocation(LocationData),
    DeliveryStatus(StatusData),
    ProductProgress(MessageData),
    DeliveryReady(MessageData),
    DeliveryCompleted(MessageData),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinData {
    Bare(Id<Delivery>),
    Object {
        #[serde(rename = "deliveryId")]
        delivery_id: Id<Delivery>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationData {
    delivery_id: Option<Id<Delivery>>,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "lon", alias = "longitude")]
    lng: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    delivery_id: Option<Id<Delivery>>,
    status: DeliveryStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageData {
    delivery_id: Option<Id<Delivery>>,
    #[serde(default)]
    message: String,
    product_collection_id: Option<Id<ProductCollection>>,
}

/// Decodes one text frame. `joined` is the delivery of the last join frame
/// on the same socket.
pub fn decode(text: &str, joined: Option<Id<Delivery>>) -> Result<Frame, WireError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let target = |delivery_id: Option<Id<Delivery>>| {
        delivery_id.or(joined).ok_or(WireError::MissingDelivery)
    };

    let (delivery_id, event) = match raw {
        RawFrame::JoinDelivery(JoinData::Bare(delivery_id))
        | RawFrame::JoinDelivery(JoinData::Object { delivery_id }) => {
            return Ok(Frame::Join(delivery_id));
        }
        RawFrame::DeliveryLocation(data) => (
            target(data.delivery_id)?,
            ChannelEvent::DelivererLocation(Coordinate::new(data.lat, data.lng)?),
        ),
        RawFrame::DeliveryStatus(data) => (
            target(data.delivery_id)?,
            ChannelEvent::StatusChanged(data.status),
        ),
        RawFrame::ProductProgress(data) => (
            target(data.delivery_id)?,
            ChannelEvent::ProductProgress {
                message: data.message,
                product_collection_id: data.product_collection_id,
            },
        ),
        RawFrame::DeliveryReady(data) => (
            target(data.delivery_id)?,
            ChannelEvent::DeliveryReady {
                message: data.message,
            },
        ),
        RawFrame::DeliveryCompleted(data) => (
            target(data.delivery_id)?,
            ChannelEvent::DeliveryCompleted {
                message: data.message,
            },
        ),
    };
    Ok(Frame::Event { delivery_id, event })
}
