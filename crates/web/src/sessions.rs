use std::{collections::HashMap, error, fmt, sync::Arc};

use backend::{BackendError, DeliverySource};
use model::{
    coordinate::Coordinate, delivery::Delivery, realtime::ChannelEvent,
    tracked_delivery::TrackedDelivery,
};
use realtime::RealtimeHub;
use tokio::sync::RwLock;
use tracking::{
    config::TrackingConfig,
    geolocation::PositionProvider,
    provider::PushedPositionProvider,
    session::{SessionOptions, TrackingSession},
    tracker::{LocationCallback, ViewerRole},
    TrackingError,
};
use utility::id::Id;

use crate::common::RouteErrorResponse;

/// An open session and, for deliverers, the provider their device posts
/// fixes to.
pub struct OpenSession {
    pub session: TrackingSession,
    pub role: ViewerRole,
    pub device: Option<Arc<PushedPositionProvider>>,
}

#[derive(Debug)]
pub enum SessionError {
    Backend(BackendError),
    Tracking(TrackingError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(why) => write!(f, "{}", why),
            Self::Tracking(why) => write!(f, "{}", why),
        }
    }
}

impl error::Error for SessionError {}

impl From<BackendError> for SessionError {
    fn from(why: BackendError) -> Self {
        Self::Backend(why)
    }
}

impl From<TrackingError> for SessionError {
    fn from(why: TrackingError) -> Self {
        Self::Tracking(why)
    }
}

impl From<SessionError> for RouteErrorResponse {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Backend(why) => why.into(),
            SessionError::Tracking(why) => why.into(),
        }
    }
}

/// The tracking sessions served by this process, at most one per delivery
/// and role.
#[derive(Clone)]
pub struct Sessions {
    open: Arc<RwLock<HashMap<(Id<Delivery>, ViewerRole), Arc<OpenSession>>>>,
    source: Arc<dyn DeliverySource>,
    hub: RealtimeHub,
    config: TrackingConfig,
}

impl Sessions {
    pub fn new(
        source: Arc<dyn DeliverySource>,
        hub: RealtimeHub,
        config: TrackingConfig,
    ) -> Self {
        Self {
            open: Arc::new(RwLock::new(HashMap::new())),
            source,
            hub,
            config,
        }
    }

    /// Returns the open session of the delivery, or opens one. A session that
    /// already ended is replaced. The flag tells whether a new session was
    /// opened.
    pub async fn open(
        &self,
        delivery_id: Id<Delivery>,
        role: ViewerRole,
    ) -> Result<(Arc<OpenSession>, bool), SessionError> {
        if let Some(existing) = self.live(delivery_id, role).await {
            return Ok((existing, false));
        }

        // the registry stays unlocked while the backend answers
        let opened = Arc::new(self.start(delivery_id, role).await?);

        let mut open = self.open.write().await;
        if let Some(existing) = open.get(&(delivery_id, role)) {
            if !existing.session.is_stopped() {
                // a concurrent request was faster
                opened.session.stop();
                return Ok((existing.clone(), false));
            }
        }
        if let Some(replaced) = open.insert((delivery_id, role), opened.clone()) {
            replaced.session.stop();
        }
        drop(open);

        self.forget_when_closed(opened.clone());
        Ok((opened, true))
    }

    async fn live(
        &self,
        delivery_id: Id<Delivery>,
        role: ViewerRole,
    ) -> Option<Arc<OpenSession>> {
        self.get(delivery_id, role)
            .await
            .filter(|open| !open.session.is_stopped())
    }

    async fn start(
        &self,
        delivery_id: Id<Delivery>,
        role: ViewerRole,
    ) -> Result<OpenSession, SessionError> {
        let record = self.source.delivery(delivery_id).await?;
        let delivery = TrackedDelivery::from_record(&record);

        let (device, on_location_update) = match role {
            ViewerRole::Deliverer => {
                let device = Arc::new(PushedPositionProvider::new());
                (Some(device), Some(self.relay_to_customers(delivery_id)))
            }
            ViewerRole::Customer => (None, None),
        };
        let session = TrackingSession::open(
            delivery,
            self.hub.subscribe(),
            SessionOptions {
                role,
                config: self.config.clone(),
                position_provider: device
                    .clone()
                    .map(|device| device as Arc<dyn PositionProvider>),
                on_location_update,
            },
        )
        .await?;

        Ok(OpenSession {
            session,
            role,
            device,
        })
    }

    /// Drops the session from the registry once it released its channel,
    /// unless it was replaced in the meantime.
    fn forget_when_closed(&self, opened: Arc<OpenSession>) {
        let open = self.open.clone();
        tokio::spawn(async move {
            opened.session.closed().await;
            let key = (opened.session.delivery_id(), opened.role);
            let mut open = open.write().await;
            if open
                .get(&key)
                .map_or(false, |current| Arc::ptr_eq(current, &opened))
            {
                open.remove(&key);
                log::debug!("forgot finished tracking session for delivery {}", key.0);
            }
        });
    }

    /// Device fixes of the deliverer become the peer location of everybody
    /// else watching the delivery.
    fn relay_to_customers(&self, delivery_id: Id<Delivery>) -> LocationCallback {
        let hub = self.hub.clone();
        Arc::new(move |coordinate: Coordinate| {
            hub.publish(delivery_id, ChannelEvent::DelivererLocation(coordinate));
        })
    }

    pub async fn get(
        &self,
        delivery_id: Id<Delivery>,
        role: ViewerRole,
    ) -> Option<Arc<OpenSession>> {
        self.open.read().await.get(&(delivery_id, role)).cloned()
    }

    /// Stops and forgets the session. Returns whether there was one.
    pub async fn close(&self, delivery_id: Id<Delivery>, role: ViewerRole) -> bool {
        let removed = self.open.write().await.remove(&(delivery_id, role));
        match removed {
            Some(open) => {
                open.session.stop();
                true
            }
            None => false,
        }
    }

    pub async fn all(&self) -> Vec<Arc<OpenSession>> {
        let mut sessions = self.open.read().await.values().cloned().collect::<Vec<_>>();
        sessions.sort_by_key(|open| {
            (open.session.delivery_id().raw(), open.role == ViewerRole::Customer)
        });
        sessions
    }
}
