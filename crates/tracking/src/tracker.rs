use std::{any::Any, collections::VecDeque, fmt, sync::Arc};

use actors::{
    actor::{Actor, ActorError, SupervisionStrategy},
    actor_ref::ActorRef,
    handler::{Handler, Message},
};
use async_trait::async_trait;
use chrono::Utc;
use model::{
    coordinate::Coordinate,
    map::MapView,
    realtime::{ChannelEvent, ConnectionState, Notification},
    tracked_delivery::TrackedDelivery,
    ExampleData,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    config::TrackingConfig,
    geolocation::{GeolocationError, Position, PositionSink},
    map, route,
};

/// Who is looking at the map. Decides where the deliverer marker comes from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ViewerRole {
    /// The deliverer's own device positions the marker. Peer locations are
    /// only used until the device has a fix.
    Deliverer,
    /// Only locations pushed by the real-time channel position the marker.
    #[default]
    Customer,
}

pub type LocationCallback = Arc<dyn Fn(Coordinate) + Send + Sync>;

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub role: ViewerRole,
    pub delivery: TrackedDelivery,
    pub map: MapView,
    pub connection: ConnectionState,
    pub geolocation_error: Option<GeolocationError>,
    pub geolocation_message: Option<String>,
    /// Most recent first.
    pub notifications: Vec<Notification>,
    pub finished: bool,
}

impl ExampleData for TrackingSnapshot {
    fn example_data() -> Self {
        let delivery = TrackedDelivery::example_data();
        Self {
            role: ViewerRole::Customer,
            map: map::render(&delivery, map::DEFAULT_TILE_URL),
            finished: delivery.is_finished(),
            delivery,
            connection: ConnectionState::Connected,
            geolocation_error: None,
            geolocation_message: None,
            notifications: vec![],
        }
    }
}

/// Owns the state of one tracking view. Every change arrives as a message,
/// every change is followed by a new snapshot.
pub struct DeliveryTracker {
    delivery: TrackedDelivery,
    role: ViewerRole,
    config: TrackingConfig,
    device_fix: Option<Position>,
    peer_location: Option<Coordinate>,
    connection: ConnectionState,
    geolocation_error: Option<GeolocationError>,
    notifications: VecDeque<Notification>,
    on_location_update: Option<LocationCallback>,
    snapshots: Arc<watch::Sender<TrackingSnapshot>>,
}

impl fmt::Debug for DeliveryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTracker")
            .field("delivery", &self.delivery.id)
            .field("role", &self.role)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl DeliveryTracker {
    pub fn new(
        delivery: TrackedDelivery,
        role: ViewerRole,
        config: TrackingConfig,
        on_location_update: Option<LocationCallback>,
        snapshots: Arc<watch::Sender<TrackingSnapshot>>,
    ) -> Self {
        let mut tracker = Self {
            delivery,
            role,
            config,
            device_fix: None,
            peer_location: None,
            connection: ConnectionState::Disconnected,
            geolocation_error: None,
            notifications: VecDeque::new(),
            on_location_update,
            snapshots,
        };
        tracker.refresh();
        tracker
    }

    /// Builds the first snapshot of a delivery without running a tracker.
    pub fn initial_snapshot(
        delivery: &TrackedDelivery,
        role: ViewerRole,
        config: &TrackingConfig,
    ) -> TrackingSnapshot {
        let mut delivery = delivery.clone();
        route::refresh_metrics(&mut delivery, config.average_speed_kmh);
        TrackingSnapshot {
            role,
            map: map::render(&delivery, &config.tile_url),
            finished: delivery.is_finished(),
            delivery,
            connection: ConnectionState::Disconnected,
            geolocation_error: None,
            geolocation_message: None,
            notifications: vec![],
        }
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            role: self.role,
            delivery: self.delivery.clone(),
            map: map::render(&self.delivery, &self.config.tile_url),
            connection: self.connection,
            geolocation_error: self.geolocation_error,
            geolocation_message: self.geolocation_error.map(|error| error.to_string()),
            notifications: self.notifications.iter().cloned().collect(),
            finished: self.delivery.is_finished(),
        }
    }

    fn refresh(&mut self) {
        route::refresh_metrics(&mut self.delivery, self.config.average_speed_kmh);
        self.snapshots.send_replace(self.snapshot());
    }

    fn on_device_position(&mut self, position: Position) {
        if let Some(callback) = &self.on_location_update {
            callback(position.coordinate);
        }
        // a good fix supersedes an earlier failure
        self.geolocation_error = None;
        if self.role == ViewerRole::Deliverer && !self.delivery.is_finished() {
            self.delivery
                .set_deliverer(position.coordinate, position.timestamp);
        }
        self.device_fix = Some(position);
    }

    fn on_peer_location(&mut self, coordinate: Coordinate) {
        self.peer_location = Some(coordinate);
        let device_has_priority =
            self.role == ViewerRole::Deliverer && self.device_fix.is_some();
        if !device_has_priority && !self.delivery.is_finished() {
            self.delivery.set_deliverer(coordinate, Utc::now());
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        if let Some(notification) = event.notification() {
            self.notifications.push_front(notification);
            self.notifications.truncate(self.config.notification_limit);
        }
        match event {
            ChannelEvent::DelivererLocation(coordinate) => self.on_peer_location(coordinate),
            ChannelEvent::StatusChanged(status) => {
                log::info!("delivery {} is now {}", self.delivery.id, status);
                self.delivery.set_status(status);
            }
            ChannelEvent::ProductProgress {
                product_collection_id: Some(collection_id),
                ..
            } => {
                if !self.delivery.mark_collected(&collection_id) {
                    log::debug!(
                        "delivery {} has no product collection {}",
                        self.delivery.id,
                        collection_id
                    );
                }
            }
            ChannelEvent::ProductProgress { .. } | ChannelEvent::DeliveryReady { .. } => {}
            ChannelEvent::DeliveryCompleted { .. } => {
                self.delivery
                    .set_status(model::delivery::DeliveryStatus::Delivered);
            }
            ChannelEvent::Connection(state) => self.connection = state,
        }
    }
}

impl Actor for DeliveryTracker {
    /// A failing message is skipped, the delivery state survives it.
    fn on_fail(&mut self, _error: Box<dyn Any + Send>) -> SupervisionStrategy {
        SupervisionStrategy::Resume
    }

    fn on_stop(&mut self) {
        log::debug!("tracker of delivery {} stopped", self.delivery.id);
    }
}

// - Messages -

pub struct DevicePosition(pub Position);

impl Message for DevicePosition {
    type Response = ();
}

pub struct DeviceError(pub GeolocationError);

impl Message for DeviceError {
    type Response = ();
}

pub struct ClearDeviceError;

impl Message for ClearDeviceError {
    type Response = ();
}

pub struct Channel(pub ChannelEvent);

impl Message for Channel {
    type Response = ();
}

pub struct GetSnapshot;

impl Message for GetSnapshot {
    type Response = TrackingSnapshot;
}

#[async_trait]
impl Handler<DevicePosition> for DeliveryTracker {
    async fn handle(&mut self, message: DevicePosition) {
        self.on_device_position(message.0);
        self.refresh();
    }
}

#[async_trait]
impl Handler<DeviceError> for DeliveryTracker {
    /// The last known position stays on the map.
    async fn handle(&mut self, message: DeviceError) {
        self.geolocation_error = Some(message.0);
        self.refresh();
    }
}

#[async_trait]
impl Handler<ClearDeviceError> for DeliveryTracker {
    async fn handle(&mut self, _: ClearDeviceError) {
        self.geolocation_error = None;
        self.refresh();
    }
}

#[async_trait]
impl Handler<Channel> for DeliveryTracker {
    async fn handle(&mut self, message: Channel) {
        self.on_channel_event(message.0);
        self.refresh();
    }
}

#[async_trait]
impl Handler<GetSnapshot> for DeliveryTracker {
    async fn handle(&mut self, _: GetSnapshot) -> TrackingSnapshot {
        self.snapshot()
    }
}

#[async_trait]
pub trait TrackerRef {
    async fn snapshot(&self) -> Result<TrackingSnapshot, ActorError>;
    async fn apply(&self, event: ChannelEvent) -> Result<(), ActorError>;
}

#[async_trait]
impl TrackerRef for ActorRef<DeliveryTracker> {
    async fn snapshot(&self) -> Result<TrackingSnapshot, ActorError> {
        self.ask(GetSnapshot).await
    }

    async fn apply(&self, event: ChannelEvent) -> Result<(), ActorError> {
        self.tell(Channel(event)).await
    }
}

#[async_trait]
impl PositionSink for ActorRef<DeliveryTracker> {
    async fn on_position(&self, position: Position) {
        if let Err(why) = self.tell(DevicePosition(position)).await {
            log::warn!("dropping device position: {}", why);
        }
    }

    async fn on_error(&self, error: GeolocationError) {
        if let Err(why) = self.tell(DeviceError(error)).await {
            log::warn!("dropping geolocation error: {}", why);
        }
    }
}
