pub use serde_with;

pub mod coordinate;
pub mod delivery;
pub mod map;
pub mod realtime;
pub mod tracked_delivery;
pub mod waypoint;

/// Provides a representative value, used for schema documentation.
pub trait ExampleData {
    fn example_data() -> Self;
}
