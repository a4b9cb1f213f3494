use model::{
    coordinate::Coordinate,
    map::{MapView, Marker, MarkerIcon},
    tracked_delivery::TrackedDelivery,
    waypoint::{Waypoint, WaypointRole},
};
use utility::geo;

use crate::route::route_of;

pub const DEFAULT_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Derives the drawable view of a delivery. Cheap enough to run on every change.
pub fn render(delivery: &TrackedDelivery, tile_url: &str) -> MapView {
    let markers = delivery
        .visible_waypoints()
        .map(marker)
        .collect::<Vec<_>>();

    let route = Some(route_of(delivery)).filter(|route| route.len() >= 2);

    let center = geo::centroid(markers.iter().map(|marker| marker.coordinate.as_tuple()))
        .and_then(|(lat, lng)| Coordinate::new(lat, lng).ok());

    MapView {
        tile_url: tile_url.to_owned(),
        markers,
        route,
        center,
        distance_km: delivery.distance_km,
        eta_minutes: delivery.eta_minutes,
    }
}

fn marker(waypoint: &Waypoint) -> Marker {
    Marker {
        role: waypoint.role,
        icon: MarkerIcon::from(waypoint),
        coordinate: waypoint.coordinate,
        popup: popup(waypoint),
    }
}

fn popup(waypoint: &Waypoint) -> String {
    let title = match (&waypoint.label, waypoint.role) {
        (Some(label), _) => label.as_str(),
        (None, WaypointRole::Deliverer) => "Deliverer",
        (None, WaypointRole::Pickup) => "Pickup",
        (None, WaypointRole::Destination) => "Destination",
    };
    if waypoint.role == WaypointRole::Pickup && waypoint.collected {
        format!("{} (collected)\n{}", title, waypoint.coordinate)
    } else {
        format!("{}\n{}", title, waypoint.coordinate)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use model::{
        delivery::DeliveryStatus,
        waypoint::{Pickup, Waypoint},
    };
    use utility::id::Id;

    use super::*;

    fn point(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    fn delivery() -> TrackedDelivery {
        let mut delivery = TrackedDelivery::new(Id::new(1));
        delivery.status = DeliveryStatus::EnRoute;
        delivery.destination = Some(Waypoint::destination(point(5.32, -4.03), None));
        delivery.pickups = vec![
            Pickup::new(
                Id::new(1),
                Waypoint::pickup(point(5.31, -4.01), Some("Chez Awa".into()), true),
            ),
            Pickup::new(Id::new(2), Waypoint::pickup(point(5.30, -4.02), None, false)),
        ];
        delivery
    }

    #[test]
    fn en_route_without_deliverer_draws_no_route() {
        let view = render(&delivery(), DEFAULT_TILE_URL);
        assert!(view.marker(WaypointRole::Deliverer).is_none());
        assert!(view.marker(WaypointRole::Destination).is_some());
        assert_eq!(
            view.markers
                .iter()
                .filter(|marker| marker.role == WaypointRole::Pickup)
                .count(),
            2
        );
        assert!(!view.has_route());
    }

    #[test]
    fn collected_pickups_keep_their_marker_but_leave_the_route() {
        let mut delivery = delivery();
        delivery.set_deliverer(point(5.29, -4.00), Utc::now());
        let view = render(&delivery, DEFAULT_TILE_URL);

        assert_eq!(view.markers.len(), 4);
        assert_eq!(view.markers[1].icon, MarkerIcon::PickupCollected);
        assert_eq!(view.markers[1].popup, "Chez Awa (collected)\n5.31000, -4.01000");
        assert_eq!(view.markers[2].icon, MarkerIcon::Pickup);
        assert_eq!(
            view.route,
            Some(vec![point(5.29, -4.00), point(5.30, -4.02), point(5.32, -4.03)])
        );
    }

    #[test]
    fn center_is_the_centroid_of_the_markers() {
        let mut delivery = TrackedDelivery::new(Id::new(1));
        delivery.destination = Some(Waypoint::destination(point(2.0, 4.0), None));
        delivery.set_deliverer(point(0.0, 0.0), Utc::now());
        let view = render(&delivery, DEFAULT_TILE_URL);
        assert_eq!(view.center, Some(point(1.0, 2.0)));
        assert_eq!(view.route.map(|route| route.len()), Some(2));
    }

    #[test]
    fn empty_delivery_renders_an_empty_map() {
        let view = render(&TrackedDelivery::new(Id::new(1)), "tiles");
        assert!(view.markers.is_empty());
        assert!(view.center.is_none());
        assert!(view.route.is_none());
        assert_eq!(view.tile_url, "tiles");
    }
}
