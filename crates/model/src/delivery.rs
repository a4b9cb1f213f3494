use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{
    id::{HasId, Id},
    serde::{lenient_bool, lenient_f64},
};

use crate::{
    coordinate::Coordinate,
    waypoint::{Pickup, Waypoint},
    ExampleData,
};

#[derive(Debug, Clone, Copy, JsonSchema)]
pub struct Delivery;

impl HasId for Delivery {
    type IdType = u64;
}

#[derive(Debug, Clone, Copy, JsonSchema)]
pub struct ProductCollection;

impl HasId for ProductCollection {
    type IdType = u64;
}

#[derive(Debug, Clone, Copy, JsonSchema)]
pub struct Shop;

impl HasId for Shop {
    type IdType = u64;
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum DeliveryStatus {
    #[default]
    #[serde(rename = "en_attente")]
    Pending,
    #[serde(rename = "collecte_en_cours")]
    Collecting,
    #[serde(rename = "en_route")]
    EnRoute,
    #[serde(rename = "livré", alias = "livre")]
    Delivered,
}

impl DeliveryStatus {
    /// No further updates are expected once a delivery reached this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "en_attente",
            Self::Collecting => "collecte_en_cours",
            Self::EnRoute => "en_route",
            Self::Delivered => "livré",
        };
        f.write_str(name)
    }
}

// - Records as returned by the marketplace backend -

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryRecord {
    pub id: Id<Delivery>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default, deserialize_with = "lenient_f64::deserialize_or_zero")]
    pub progress: f64,
    #[serde(default)]
    pub validation_code: Option<String>,
    #[serde(default)]
    pub order: Option<OrderRecord>,
    #[serde(default, rename = "productCollections", alias = "product_collections")]
    pub product_collections: Vec<ProductCollectionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    #[serde(default, deserialize_with = "lenient_f64::deserialize_option")]
    pub delivery_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::deserialize_option")]
    pub delivery_longitude: Option<f64>,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductCollectionRecord {
    pub id: Id<ProductCollection>,
    #[serde(default, deserialize_with = "lenient_bool::deserialize")]
    pub collected: bool,
    #[serde(default)]
    pub shop: Option<ShopRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopRecord {
    #[serde(default)]
    pub id: Option<Id<Shop>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64::deserialize_option")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::deserialize_option")]
    pub longitude: Option<f64>,
}

impl DeliveryRecord {
    /// The drop-off point, if the order has been geocoded.
    pub fn destination(&self) -> Option<Waypoint> {
        let order = self.order.as_ref()?;
        let coordinate =
            Coordinate::from_parts(order.delivery_latitude, order.delivery_longitude)?;
        Some(Waypoint::destination(
            coordinate,
            order.delivery_address.clone(),
        ))
    }

    /// Pickups in the order the backend listed them. Shops without a usable
    /// location are left out.
    pub fn pickups(&self) -> Vec<Pickup> {
        self.product_collections
            .iter()
            .filter_map(|collection| {
                let shop = collection.shop.as_ref()?;
                let coordinate = Coordinate::from_parts(shop.latitude, shop.longitude)?;
                Some(Pickup::new(
                    collection.id,
                    Waypoint::pickup(coordinate, shop.name.clone(), collection.collected),
                ))
            })
            .collect()
    }
}

impl ExampleData for DeliveryStatus {
    fn example_data() -> Self {
        Self::EnRoute
    }
}
