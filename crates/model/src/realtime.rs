use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{
    coordinate::Coordinate,
    delivery::{DeliveryStatus, ProductCollection},
};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<bool> for ConnectionState {
    fn from(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

/// Something that happened to a delivery, pushed by the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    DelivererLocation(Coordinate),
    StatusChanged(DeliveryStatus),
    ProductProgress {
        message: String,
        product_collection_id: Option<Id<ProductCollection>>,
    },
    DeliveryReady {
        message: String,
    },
    DeliveryCompleted {
        message: String,
    },
    Connection(ConnectionState),
}

impl ChannelEvent {
    /// Whether this event ends the delivery.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::StatusChanged(status) => status.is_terminal(),
            Self::DeliveryCompleted { .. } => true,
            _ => false,
        }
    }

    /// The user facing message carried by this event, if any.
    pub fn notification(&self) -> Option<Notification> {
        let (kind, message) = match self {
            Self::ProductProgress { message, .. } => {
                (NotificationKind::ProductProgress, message)
            }
            Self::DeliveryReady { message } => (NotificationKind::DeliveryReady, message),
            Self::DeliveryCompleted { message } => {
                (NotificationKind::DeliveryCompleted, message)
            }
            _ => return None,
        };
        Some(Notification {
            kind,
            message: message.clone(),
            received_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    ProductProgress,
    DeliveryReady,
    DeliveryCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub received_at: DateTime<Utc>,
}
