use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{coordinate::Coordinate, delivery::ProductCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum WaypointRole {
    Deliverer,
    Pickup,
    Destination,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub role: WaypointRole,
    pub coordinate: Coordinate,
    pub label: Option<String>,
    /// Only meaningful for pickups.
    #[serde(default)]
    pub collected: bool,
}

impl Waypoint {
    pub fn deliverer(coordinate: Coordinate) -> Self {
        Self {
            role: WaypointRole::Deliverer,
            coordinate,
            label: None,
            collected: false,
        }
    }

    pub fn destination(coordinate: Coordinate, label: Option<String>) -> Self {
        Self {
            role: WaypointRole::Destination,
            coordinate,
            label,
            collected: false,
        }
    }

    pub fn pickup(coordinate: Coordinate, label: Option<String>, collected: bool) -> Self {
        Self {
            role: WaypointRole::Pickup,
            coordinate,
            label,
            collected,
        }
    }

    pub fn is_pending_pickup(&self) -> bool {
        self.role == WaypointRole::Pickup && !self.collected
    }
}

/// A shop the deliverer has to visit, keyed by the product collection it
/// belongs to.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pickup {
    pub collection_id: Id<ProductCollection>,
    #[serde(flatten)]
    pub waypoint: Waypoint,
}

impl Pickup {
    pub fn new(collection_id: Id<ProductCollection>, waypoint: Waypoint) -> Self {
        Self {
            collection_id,
            waypoint,
        }
    }
}
