use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use utility::id::Id;

use crate::{
    coordinate::Coordinate,
    delivery::{Delivery, DeliveryRecord, DeliveryStatus, ProductCollection},
    waypoint::{Pickup, Waypoint},
    ExampleData,
};

/// The state behind one open tracking view.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackedDelivery {
    pub id: Id<Delivery>,
    pub status: DeliveryStatus,
    /// Percentage in `0..=100`.
    pub progress: f64,
    pub validation_code: Option<String>,
    pub deliverer: Option<Waypoint>,
    pub destination: Option<Waypoint>,
    /// In the order the pickups were assigned.
    pub pickups: Vec<Pickup>,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<u32>,
    pub last_update: Option<DateTime<Utc>>,
}

impl TrackedDelivery {
    pub fn new(id: Id<Delivery>) -> Self {
        Self {
            id,
            status: DeliveryStatus::default(),
            progress: 0.0,
            validation_code: None,
            deliverer: None,
            destination: None,
            pickups: vec![],
            distance_km: None,
            eta_minutes: None,
            last_update: None,
        }
    }

    pub fn from_record(record: &DeliveryRecord) -> Self {
        Self {
            status: record.status,
            progress: record.progress.clamp(0.0, 100.0),
            validation_code: record.validation_code.clone(),
            destination: record.destination(),
            pickups: record.pickups(),
            ..Self::new(record.id)
        }
    }

    /// Moves the deliverer. The latest call wins.
    pub fn set_deliverer(&mut self, coordinate: Coordinate, at: DateTime<Utc>) {
        self.deliverer = Some(Waypoint::deliverer(coordinate));
        self.last_update = Some(at);
    }

    pub fn set_status(&mut self, status: DeliveryStatus) {
        self.status = status;
        if status.is_terminal() {
            self.progress = 100.0;
        }
    }

    /// Flags a pickup as collected. Returns `false` for unknown collections.
    pub fn mark_collected(&mut self, collection_id: &Id<ProductCollection>) -> bool {
        match self
            .pickups
            .iter_mut()
            .find(|pickup| pickup.collection_id == *collection_id)
        {
            Some(pickup) => {
                pickup.waypoint.collected = true;
                true
            }
            None => false,
        }
    }

    pub fn pickup_waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.pickups.iter().map(|pickup| &pickup.waypoint)
    }

    /// Every waypoint that gets a marker on the map.
    pub fn visible_waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.deliverer
            .iter()
            .chain(self.pickup_waypoints())
            .chain(self.destination.iter())
    }

    pub fn set_metrics(&mut self, distance_km: Option<f64>, eta_minutes: Option<u32>) {
        self.distance_km = distance_km;
        self.eta_minutes = eta_minutes;
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

impl ExampleData for TrackedDelivery {
    fn example_data() -> Self {
        let mut delivery = Self::new(Id::new(12));
        delivery.status = DeliveryStatus::EnRoute;
        delivery.progress = 60.0;
        delivery.destination = Some(Waypoint::destination(
            Coordinate {
                lat: 5.3200,
                lng: -4.0300,
            },
            Some("Cocody, Abidjan".to_owned()),
        ));
        delivery.pickups = vec![Pickup::new(
            Id::new(1),
            Waypoint::pickup(Coordinate::example_data(), Some("Chez Awa".to_owned()), true),
        )];
        delivery.set_deliverer(
            Coordinate {
                lat: 5.3180,
                lng: -4.0320,
            },
            Utc::now(),
        );
        delivery
    }
}
