use itertools::Itertools;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average courier speed used when nothing better is configured.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 25.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude_2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` a hair outside of [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Linear travel time estimate: `round(distance / speed * 60)`.
///
/// This knows nothing about roads or traffic. It is a rough figure to show
/// next to the map, not a routing result. Invalid input yields zero.
pub fn eta_minutes(distance_km: f64, average_speed_kmh: f64) -> u32 {
    if !distance_km.is_finite()
        || !average_speed_kmh.is_finite()
        || distance_km <= 0.0
        || average_speed_kmh <= 0.0
    {
        return 0;
    }
    // float to int casts saturate
    (distance_km / average_speed_kmh * 60.0).round() as u32
}

/// Length of a polyline given as `(latitude, longitude)` pairs.
pub fn path_length_km<I>(points: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    points
        .into_iter()
        .tuple_windows()
        .map(|((lat1, lon1), (lat2, lon2))| haversine_distance(lat1, lon1, lat2, lon2))
        .sum()
}

/// Arithmetic mean of the given `(latitude, longitude)` pairs.
pub fn centroid<I>(points: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (count, lat_sum, lon_sum) = points
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(count, lat, lon), (p_lat, p_lon)| {
            (count + 1, lat + p_lat, lon + p_lon)
        });
    if count == 0 {
        return None;
    }
    Some((lat_sum / count as f64, lon_sum / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABIDJAN_A: (f64, f64) = (5.3167, -4.0333);
    const ABIDJAN_B: (f64, f64) = (5.3200, -4.0300);

    #[test]
    fn distance_of_known_points() {
        let d = haversine_distance(ABIDJAN_A.0, ABIDJAN_A.1, ABIDJAN_B.0, ABIDJAN_B.1);
        assert!((d - 0.49).abs() <= 0.05, "got {d}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_itself() {
        let points = [
            ABIDJAN_A,
            ABIDJAN_B,
            (48.8566, 2.3522),
            (-33.8688, 151.2093),
            (90.0, 0.0),
            (-90.0, 180.0),
        ];
        for a in points {
            assert_eq!(haversine_distance(a.0, a.1, a.0, a.1), 0.0);
            for b in points {
                let ab = haversine_distance(a.0, a.1, b.0, b.1);
                let ba = haversine_distance(b.0, b.1, a.0, a.1);
                assert!(ab >= 0.0);
                assert!((ab - ba).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn antipodal_distance_is_half_the_circumference() {
        let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn eta_uses_linear_model() {
        assert_eq!(eta_minutes(12.5, 25.0), 30);
        assert_eq!(eta_minutes(0.49, DEFAULT_AVERAGE_SPEED_KMH), 1);
        assert_eq!(eta_minutes(0.0, 25.0), 0);
    }

    #[test]
    fn eta_of_invalid_input_is_zero() {
        assert_eq!(eta_minutes(-3.0, 25.0), 0);
        assert_eq!(eta_minutes(10.0, 0.0), 0);
        assert_eq!(eta_minutes(f64::NAN, 25.0), 0);
        assert_eq!(eta_minutes(10.0, f64::INFINITY), 0);
    }

    #[test]
    fn path_length_sums_segments() {
        let direct = haversine_distance(ABIDJAN_A.0, ABIDJAN_A.1, ABIDJAN_B.0, ABIDJAN_B.1);
        let there_and_back = path_length_km([ABIDJAN_A, ABIDJAN_B, ABIDJAN_A]);
        assert!((there_and_back - 2.0 * direct).abs() < 1e-9);
        assert_eq!(path_length_km([ABIDJAN_A]), 0.0);
        assert_eq!(path_length_km(Vec::new()), 0.0);
    }

    #[test]
    fn centroid_of_points() {
        assert_eq!(centroid(Vec::new()), None);
        assert_eq!(centroid([(1.0, 2.0)]), Some((1.0, 2.0)));
        assert_eq!(centroid([(0.0, 0.0), (2.0, 4.0)]), Some((1.0, 2.0)));
    }
}
