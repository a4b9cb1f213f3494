use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use actors::actor_ref::ActorRef;
use model::{
    delivery::Delivery,
    realtime::{ChannelEvent, ConnectionState},
    tracked_delivery::TrackedDelivery,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use utility::id::Id;

use crate::{
    channel::UpdateChannel,
    config::TrackingConfig,
    geolocation::{GeolocationSource, PositionProvider, WatchHandle},
    tracker::{
        ClearDeviceError, DeliveryTracker, LocationCallback, TrackerRef, TrackingSnapshot,
        ViewerRole,
    },
    TrackingError, TrackingResult,
};

pub struct SessionOptions {
    pub role: ViewerRole,
    pub config: TrackingConfig,
    /// Device positioning. Without one, only the channel moves the deliverer.
    pub position_provider: Option<Arc<dyn PositionProvider>>,
    /// Fired for every fix of the local device.
    pub on_location_update: Option<LocationCallback>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            role: ViewerRole::default(),
            config: TrackingConfig::default(),
            position_provider: None,
            on_location_update: None,
        }
    }
}

/// One open tracking view: a tracker fed by a geolocation watch and a
/// real-time channel. Stopping it releases both. Dropping it stops it.
pub struct TrackingSession {
    delivery_id: Id<Delivery>,
    tracker: ActorRef<DeliveryTracker>,
    snapshots: watch::Receiver<TrackingSnapshot>,
    geolocation: Option<GeolocationSource>,
    watch: Arc<Mutex<Option<WatchHandle>>>,
    shutdown: CancellationToken,
    channel_closed: CancellationToken,
    stopped: AtomicBool,
}

impl TrackingSession {
    pub async fn open<C: UpdateChannel>(
        delivery: TrackedDelivery,
        mut channel: C,
        options: SessionOptions,
    ) -> TrackingResult<Self> {
        let delivery_id = delivery.id;
        let SessionOptions {
            role,
            config,
            position_provider,
            on_location_update,
        } = options;

        let finished = delivery.is_finished();
        if !finished {
            channel.join(delivery_id).await?;
        }

        let (tx, snapshots) = watch::channel(DeliveryTracker::initial_snapshot(
            &delivery, role, &config,
        ));
        let tx = Arc::new(tx);
        let tracker = {
            let config = config.clone();
            actors::run(move || {
                DeliveryTracker::new(
                    delivery.clone(),
                    role,
                    config.clone(),
                    on_location_update.clone(),
                    tx.clone(),
                )
            })
        };
        tracker
            .apply(ChannelEvent::Connection(channel.connection_state()))
            .await?;

        let session = Self {
            delivery_id,
            geolocation: position_provider
                .map(|provider| GeolocationSource::new(provider, config.watch.clone())),
            tracker,
            snapshots,
            watch: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            channel_closed: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        };

        if finished {
            // nothing left to follow
            log::info!("delivery {} is already finished", delivery_id);
            channel.leave().await;
            session.channel_closed.cancel();
            session.stop();
            return Ok(session);
        }

        tokio::spawn(pump(
            channel,
            session.tracker.clone(),
            session.watch.clone(),
            session.shutdown.clone(),
            session.channel_closed.clone(),
        ));
        session.start_watch();

        log::info!("tracking session for delivery {} opened", delivery_id);
        Ok(session)
    }

    pub fn delivery_id(&self) -> Id<Delivery> {
        self.delivery_id
    }

    /// The latest snapshot, without waiting for the tracker.
    pub fn current(&self) -> TrackingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A snapshot taken by the tracker after every queued message was handled.
    pub async fn snapshot(&self) -> TrackingResult<TrackingSnapshot> {
        Ok(self.tracker.snapshot().await?)
    }

    /// Receives a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshots.clone()
    }

    pub fn tracker(&self) -> &ActorRef<DeliveryTracker> {
        &self.tracker
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.shutdown.is_cancelled()
    }

    /// Whether the device is currently being located.
    pub fn is_watching(&self) -> bool {
        lock(&self.watch)
            .as_ref()
            .map_or(false, WatchHandle::is_active)
    }

    /// Starts a fresh geolocation watch, e.g. after the user granted access.
    pub async fn retry_geolocation(&self) -> TrackingResult<()> {
        if self.is_stopped() {
            return Err(TrackingError::Closed);
        }
        if self.geolocation.is_none() {
            return Err(TrackingError::NoPositionProvider);
        }
        self.tracker.tell(ClearDeviceError).await?;
        if self.start_watch() {
            Ok(())
        } else {
            Err(TrackingError::Closed)
        }
    }

    /// Replaces the running watch. Returns false once the session stopped.
    fn start_watch(&self) -> bool {
        let Some(source) = &self.geolocation else {
            return false;
        };
        // `stop` and the pump mark the session stopped under this lock
        let mut slot = lock(&self.watch);
        if self.is_stopped() {
            return false;
        }
        if let Some(previous) = slot.replace(source.start(self.tracker.clone())) {
            previous.stop();
        }
        true
    }

    /// Releases the geolocation watch and leaves the channel. Safe to call
    /// any number of times.
    pub fn stop(&self) {
        let handle = {
            let mut slot = lock(&self.watch);
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            self.shutdown.cancel();
            slot.take()
        };
        if let Some(handle) = handle {
            handle.stop();
        }
        log::info!("tracking session for delivery {} stopped", self.delivery_id);
    }

    /// Waits until the channel subscription has been released.
    pub async fn closed(&self) {
        self.channel_closed.cancelled().await
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(watch: &Mutex<Option<WatchHandle>>) -> std::sync::MutexGuard<'_, Option<WatchHandle>> {
    // the guarded value is a plain handle and can not be left half updated
    watch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards channel events to the tracker until the session shuts down, the
/// channel closes or the delivery is finished.
async fn pump<C: UpdateChannel>(
    mut channel: C,
    tracker: ActorRef<DeliveryTracker>,
    watch: Arc<Mutex<Option<WatchHandle>>>,
    shutdown: CancellationToken,
    channel_closed: CancellationToken,
) {
    let _closed = channel_closed.drop_guard();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = channel.next_event() => event,
        };
        let Some(event) = event else {
            log::warn!("real-time channel closed");
            let _ = tracker
                .apply(ChannelEvent::Connection(ConnectionState::Disconnected))
                .await;
            break;
        };
        let terminal = event.is_terminal();
        if let Err(why) = tracker.apply(event).await {
            log::error!("tracker is gone: {}", why);
            break;
        }
        if terminal {
            log::info!("delivery finished, releasing tracking resources");
            // let the tracker publish its final snapshot first
            let _ = tracker.snapshot().await;
            let handle = {
                let mut slot = lock(&watch);
                shutdown.cancel();
                slot.take()
            };
            if let Some(handle) = handle {
                handle.stop();
            }
            break;
        }
    }
    channel.leave().await;
}
