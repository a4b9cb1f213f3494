use model::{coordinate::Coordinate, tracked_delivery::TrackedDelivery, waypoint::Waypoint};
use utility::geo;

/// Orders the points the deliverer still has to pass: the deliverer first,
/// then every pickup not yet collected in the given order, the destination
/// last.
///
/// Without a deliverer or a destination there is no meaningful route and the
/// result is empty.
pub fn build_route<'a, I>(
    deliverer: Option<&Coordinate>,
    pickups: I,
    destination: Option<&Coordinate>,
) -> Vec<Coordinate>
where
    I: IntoIterator<Item = &'a Waypoint>,
{
    let (Some(deliverer), Some(destination)) = (deliverer, destination) else {
        return vec![];
    };
    std::iter::once(*deliverer)
        .chain(
            pickups
                .into_iter()
                .filter(|pickup| pickup.is_pending_pickup())
                .map(|pickup| pickup.coordinate),
        )
        .chain(std::iter::once(*destination))
        .collect()
}

pub fn route_of(delivery: &TrackedDelivery) -> Vec<Coordinate> {
    build_route(
        delivery.deliverer.as_ref().map(|waypoint| &waypoint.coordinate),
        delivery.pickup_waypoints(),
        delivery.destination.as_ref().map(|waypoint| &waypoint.coordinate),
    )
}

/// Remaining distance along the route and the matching travel time.
pub fn route_metrics(route: &[Coordinate], average_speed_kmh: f64) -> Option<(f64, u32)> {
    if route.is_empty() {
        return None;
    }
    let distance = geo::path_length_km(route.iter().map(Coordinate::as_tuple));
    Some((distance, geo::eta_minutes(distance, average_speed_kmh)))
}

/// Recomputes the derived distance and ETA of a delivery.
pub fn refresh_metrics(delivery: &mut TrackedDelivery, average_speed_kmh: f64) {
    match route_metrics(&route_of(delivery), average_speed_kmh) {
        Some((distance, eta)) => delivery.set_metrics(Some(distance), Some(eta)),
        None => delivery.set_metrics(None, None),
    }
}
