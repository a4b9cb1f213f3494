use std::{error::Error, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::geo;

use crate::ExampleData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    NotFinite,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite => write!(f, "coordinate is not a finite number"),
            Self::LatitudeOutOfRange(lat) => {
                write!(f, "latitude {} is outside of [-90, 90]", lat)
            }
            Self::LongitudeOutOfRange(lng) => {
                write!(f, "longitude {} is outside of [-180, 180]", lng)
            }
        }
    }
}

impl Error for CoordinateError {}

/// A point on the earth in decimal degrees. Always within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    #[serde(alias = "lon", alias = "long")]
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lng)
    }
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Builds a coordinate from optional parts, as found in backend records.
    /// Missing or invalid parts mean "not yet available".
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        Self::new(lat?, lng?).ok()
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(*self, *other)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

impl ExampleData for Coordinate {
    fn example_data() -> Self {
        Self {
            lat: 5.3167,
            lng: -4.0333,
        }
    }
}

/// Haversine distance in kilometers.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    geo::haversine_distance(a.lat, a.lng, b.lat, b.lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.1),
            Err(CoordinateError::LongitudeOutOfRange(-180.1))
        );
        assert_eq!(Coordinate::new(f64::NAN, 0.0), Err(CoordinateError::NotFinite));
    }

    #[test]
    fn missing_parts_are_not_available() {
        assert_eq!(Coordinate::from_parts(None, Some(1.0)), None);
        assert_eq!(Coordinate::from_parts(Some(100.0), Some(1.0)), None);
        assert_eq!(
            Coordinate::from_parts(Some(1.0), Some(2.0)),
            Some(Coordinate { lat: 1.0, lng: 2.0 })
        );
    }

    #[test]
    fn deserialization_validates() {
        let ok: Coordinate = serde_json::from_str(r#"{"lat": 5.32, "lng": -4.03}"#).unwrap();
        assert_eq!(ok, Coordinate::new(5.32, -4.03).unwrap());
        let lon: Coordinate = serde_json::from_str(r#"{"lat": 5.32, "lon": -4.03}"#).unwrap();
        assert_eq!(lon, ok);
        assert!(serde_json::from_str::<Coordinate>(r#"{"lat": 95, "lng": 0}"#).is_err());
    }

    #[test]
    fn known_distance() {
        let a = Coordinate::new(5.3167, -4.0333).unwrap();
        let b = Coordinate::new(5.3200, -4.0300).unwrap();
        assert!((distance_km(a, b) - 0.49).abs() <= 0.05);
        assert_eq!(a.distance_km(&a), 0.0);
        assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-12);
    }
}
