use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    coordinate::Coordinate,
    waypoint::{Waypoint, WaypointRole},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MarkerIcon {
    Deliverer,
    Pickup,
    PickupCollected,
    Destination,
}

impl From<&Waypoint> for MarkerIcon {
    fn from(waypoint: &Waypoint) -> Self {
        match (waypoint.role, waypoint.collected) {
            (WaypointRole::Deliverer, _) => Self::Deliverer,
            (WaypointRole::Pickup, false) => Self::Pickup,
            (WaypointRole::Pickup, true) => Self::PickupCollected,
            (WaypointRole::Destination, _) => Self::Destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub role: WaypointRole,
    pub icon: MarkerIcon,
    pub coordinate: Coordinate,
    pub popup: String,
}

/// Everything a map widget needs to draw a tracked delivery.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub tile_url: String,
    pub markers: Vec<Marker>,
    /// Straight segments between waypoints. Absent with fewer than two points.
    pub route: Option<Vec<Coordinate>>,
    pub center: Option<Coordinate>,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<u32>,
}

impl MapView {
    pub fn marker(&self, role: WaypointRole) -> Option<&Marker> {
        self.markers.iter().find(|marker| marker.role == role)
    }

    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }
}
