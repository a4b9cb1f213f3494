use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use model::{
    coordinate::Coordinate,
    delivery::{Delivery, DeliveryRecord, DeliveryStatus},
    realtime::{ChannelEvent, ConnectionState},
    tracked_delivery::TrackedDelivery,
    waypoint::WaypointRole,
};
use tokio::{sync::mpsc, time};
use tracking::{
    channel::{ChannelError, UpdateChannel},
    config::TrackingConfig,
    geolocation::{GeolocationError, Position, PositionOptions, PositionProvider},
    session::{SessionOptions, TrackingSession},
    tracker::{ClearDeviceError, LocationCallback, TrackingSnapshot, ViewerRole},
    TrackingError,
};
use utility::id::Id;

struct FakeChannel {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    joined: Arc<Mutex<Option<Id<Delivery>>>>,
    leaves: Arc<AtomicUsize>,
    left: bool,
}

#[async_trait]
impl UpdateChannel for FakeChannel {
    async fn join(&mut self, delivery_id: Id<Delivery>) -> Result<(), ChannelError> {
        *self.joined.lock().unwrap() = Some(delivery_id);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    async fn leave(&mut self) {
        if !self.left {
            self.left = true;
            self.leaves.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct Harness {
    events: mpsc::UnboundedSender<ChannelEvent>,
    joined: Arc<Mutex<Option<Id<Delivery>>>>,
    leaves: Arc<AtomicUsize>,
}

fn channel() -> (FakeChannel, Harness) {
    let (tx, rx) = mpsc::unbounded_channel();
    let joined = Arc::new(Mutex::new(None));
    let leaves = Arc::new(AtomicUsize::new(0));
    (
        FakeChannel {
            events: rx,
            joined: joined.clone(),
            leaves: leaves.clone(),
            left: false,
        },
        Harness {
            events: tx,
            joined,
            leaves,
        },
    )
}

/// Always knows where the device is; counts how often it was asked.
struct FixedProvider {
    position: Coordinate,
    requests: AtomicUsize,
    denied: bool,
}

#[async_trait]
impl PositionProvider for FixedProvider {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Position, GeolocationError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.denied {
            Err(GeolocationError::PermissionDenied)
        } else {
            Ok(Position::new(self.position))
        }
    }
}

fn point(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).unwrap()
}

fn delivery_with_status(status: &str) -> TrackedDelivery {
    let record: DeliveryRecord = serde_json::from_value(serde_json::json!({
        "id": 21,
        "status": status,
        "order": { "delivery_latitude": "5.3200", "delivery_longitude": "-4.0300" },
        "productCollections": [
            { "id": 1, "shop": { "name": "A", "latitude": 5.31, "longitude": -4.01 } }
        ]
    }))
    .unwrap();
    TrackedDelivery::from_record(&record)
}

fn delivery() -> TrackedDelivery {
    delivery_with_status("en_route")
}

fn fast_polling() -> TrackingConfig {
    let mut config = TrackingConfig::default();
    config.watch.poll_interval = Duration::from_millis(20);
    config
}

async fn wait_for<F>(session: &TrackingSession, condition: F) -> TrackingSnapshot
where
    F: Fn(&TrackingSnapshot) -> bool,
{
    let mut snapshots = session.subscribe();
    time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = snapshots.borrow_and_update();
                if condition(&snapshot) {
                    return snapshot.clone();
                }
            }
            snapshots.changed().await.unwrap();
        }
    })
    .await
    .expect("condition was not met in time")
}

#[tokio::test]
async fn joins_the_delivery_and_reports_connection() {
    let (channel, harness) = channel();
    let session = TrackingSession::open(delivery(), channel, SessionOptions::default())
        .await
        .unwrap();

    assert_eq!(*harness.joined.lock().unwrap(), Some(Id::new(21)));
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    assert!(snapshot.map.marker(WaypointRole::Deliverer).is_none());
    assert!(snapshot.map.route.is_none());
}

#[tokio::test]
async fn shows_the_last_of_several_locations() {
    let (channel, harness) = channel();
    let session = TrackingSession::open(delivery(), channel, SessionOptions::default())
        .await
        .unwrap();

    let locations = [point(5.300, -4.000), point(5.305, -4.005), point(5.310, -4.010)];
    for location in locations {
        harness
            .events
            .send(ChannelEvent::DelivererLocation(location))
            .unwrap();
        time::sleep(Duration::from_millis(5)).await;
    }

    let snapshot = wait_for(&session, |snapshot| {
        snapshot
            .map
            .marker(WaypointRole::Deliverer)
            .map_or(false, |marker| marker.coordinate == locations[2])
    })
    .await;
    assert_eq!(snapshot.map.route.as_ref().map(Vec::len), Some(3));
    assert!(snapshot.delivery.distance_km.unwrap() > 0.0);
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_everything() {
    let (channel, harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: false,
    });
    let session = TrackingSession::open(
        delivery(),
        channel,
        SessionOptions {
            role: ViewerRole::Deliverer,
            position_provider: Some(provider.clone()),
            ..SessionOptions::default()
        },
    )
    .await
    .unwrap();
    assert!(session.is_watching());

    session.stop();
    session.stop();
    session.closed().await;

    assert!(session.is_stopped());
    assert!(!session.is_watching());
    assert_eq!(harness.leaves.load(Ordering::SeqCst), 1);
    assert!(matches!(
        session.retry_geolocation().await,
        Err(TrackingError::Closed)
    ));
}

#[tokio::test]
async fn device_fixes_move_the_deliverer_and_reach_the_callback() {
    let (channel, _harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: false,
    });
    let updates = Arc::new(Mutex::new(vec![]));
    let callback: LocationCallback = {
        let updates = updates.clone();
        Arc::new(move |coordinate: Coordinate| updates.lock().unwrap().push(coordinate))
    };
    let session = TrackingSession::open(
        delivery(),
        channel,
        SessionOptions {
            role: ViewerRole::Deliverer,
            position_provider: Some(provider.clone()),
            on_location_update: Some(callback),
            ..SessionOptions::default()
        },
    )
    .await
    .unwrap();

    let snapshot = wait_for(&session, |snapshot| snapshot.delivery.deliverer.is_some()).await;
    assert_eq!(
        snapshot.delivery.deliverer.unwrap().coordinate,
        point(5.3, -4.0)
    );
    assert!(!updates.lock().unwrap().is_empty());
    assert!(provider.requests.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn denied_permission_is_shown_and_can_be_retried() {
    let (channel, _harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: true,
    });
    let session = TrackingSession::open(
        delivery(),
        channel,
        SessionOptions {
            role: ViewerRole::Deliverer,
            position_provider: Some(provider.clone()),
            ..SessionOptions::default()
        },
    )
    .await
    .unwrap();

    let snapshot = wait_for(&session, |snapshot| snapshot.geolocation_error.is_some()).await;
    assert_eq!(
        snapshot.geolocation_error,
        Some(GeolocationError::PermissionDenied)
    );

    session.retry_geolocation().await.unwrap();
    time::timeout(Duration::from_secs(5), async {
        while provider.requests.load(Ordering::SeqCst) < 2 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the watch was not restarted");
    wait_for(&session, |snapshot| snapshot.geolocation_error.is_some()).await;
    assert_eq!(provider.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn finished_delivery_closes_the_session() {
    let (channel, harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: false,
    });
    let session = TrackingSession::open(
        delivery(),
        channel,
        SessionOptions {
            position_provider: Some(provider),
            ..SessionOptions::default()
        },
    )
    .await
    .unwrap();

    harness
        .events
        .send(ChannelEvent::StatusChanged(DeliveryStatus::Delivered))
        .unwrap();
    session.closed().await;

    let snapshot = session.current();
    assert!(snapshot.finished);
    assert!(session.is_stopped());
    assert!(!session.is_watching());
    assert_eq!(harness.leaves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn closed_channel_shows_disconnected() {
    let (channel, harness) = channel();
    let session = TrackingSession::open(delivery(), channel, SessionOptions::default())
        .await
        .unwrap();

    drop(harness.events);
    session.closed().await;
    let snapshot = wait_for(&session, |snapshot| {
        snapshot.connection == ConnectionState::Disconnected
    })
    .await;
    assert!(!snapshot.finished);
}

#[tokio::test]
async fn already_delivered_delivery_is_not_followed() {
    let (channel, harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: false,
    });
    let session = TrackingSession::open(
        delivery_with_status("livré"),
        channel,
        SessionOptions {
            role: ViewerRole::Deliverer,
            position_provider: Some(provider.clone()),
            ..SessionOptions::default()
        },
    )
    .await
    .unwrap();
    session.closed().await;

    assert!(session.current().finished);
    assert!(session.is_stopped());
    assert!(!session.is_watching());
    assert_eq!(*harness.joined.lock().unwrap(), None);
    assert_eq!(harness.leaves.load(Ordering::SeqCst), 1);
    assert_eq!(provider.requests.load(Ordering::SeqCst), 0);
    assert!(matches!(
        session.retry_geolocation().await,
        Err(TrackingError::Closed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_while_retrying_leaves_no_watch() {
    let (channel, _harness) = channel();
    let provider = Arc::new(FixedProvider {
        position: point(5.3, -4.0),
        requests: AtomicUsize::new(0),
        denied: false,
    });

    // the first fix blocks the tracker inside the callback until `held` drops
    let gate = Arc::new(RwLock::new(()));
    let entered = Arc::new(AtomicBool::new(false));
    let held = gate.write().unwrap();
    let callback: LocationCallback = {
        let gate = gate.clone();
        let entered = entered.clone();
        Arc::new(move |_: Coordinate| {
            entered.store(true, Ordering::SeqCst);
            drop(gate.read().unwrap());
        })
    };
    let session = Arc::new(
        TrackingSession::open(
            delivery(),
            channel,
            SessionOptions {
                role: ViewerRole::Deliverer,
                config: fast_polling(),
                position_provider: Some(provider.clone()),
                on_location_update: Some(callback),
            },
        )
        .await
        .unwrap(),
    );

    time::timeout(Duration::from_secs(5), async {
        while !entered.load(Ordering::SeqCst) {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no fix reached the tracker");
    // with a full mailbox the retry waits inside `tell`
    while session.tracker().try_tell(ClearDeviceError).is_ok() {}

    let retry = {
        let session = session.clone();
        tokio::spawn(async move { session.retry_geolocation().await })
    };
    time::sleep(Duration::from_millis(50)).await;
    assert!(!retry.is_finished());

    session.stop();
    session.stop();
    drop(held);

    let retried = time::timeout(Duration::from_secs(5), retry)
        .await
        .expect("retry never returned")
        .unwrap();
    assert!(matches!(retried, Err(TrackingError::Closed)));
    assert!(!session.is_watching());

    time::sleep(Duration::from_millis(50)).await;
    let requests = provider.requests.load(Ordering::SeqCst);
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(provider.requests.load(Ordering::SeqCst), requests);
}
