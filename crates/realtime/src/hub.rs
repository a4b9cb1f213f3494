use std::sync::Arc;

use async_trait::async_trait;
use model::{
    delivery::Delivery,
    realtime::{ChannelEvent, ConnectionState},
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};
use tracking::channel::{ChannelError, UpdateChannel};
use utility::id::Id;

pub const DEFAULT_CAPACITY: usize = 256;

type Envelope = (Id<Delivery>, ChannelEvent);

struct Inner {
    events: broadcast::Sender<Envelope>,
    /// Number of attached upstream publishers.
    publishers: watch::Sender<usize>,
}

/// In-process fan-out of delivery events. Publishers push events tagged with
/// their delivery; every subscription only sees the delivery it joined.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<Inner>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (publishers, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner { events, publishers }),
        }
    }

    /// Sends `event` to everyone who joined `delivery_id`. Returns the number
    /// of subscriptions that received it.
    pub fn publish(&self, delivery_id: Id<Delivery>, event: ChannelEvent) -> usize {
        log::debug!("publishing {:?} for delivery {}", event, delivery_id);
        self.inner.events.send((delivery_id, event)).unwrap_or(0)
    }

    /// Registers an upstream publisher. The hub reports `Connected` while at
    /// least one is attached.
    pub fn attach(&self) -> Publisher {
        self.inner.publishers.send_modify(|count| *count += 1);
        log::info!("real-time publisher attached");
        Publisher { hub: self.clone() }
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from(*self.inner.publishers.borrow() > 0)
    }

    pub fn subscribe(&self) -> HubSubscription {
        let connection = self.inner.publishers.subscribe();
        let state = ConnectionState::from(*connection.borrow() > 0);
        HubSubscription {
            events: None,
            hub: self.clone(),
            connection,
            state,
            delivery_id: None,
            left: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }
}

/// An attached upstream. Detaches on drop.
pub struct Publisher {
    hub: RealtimeHub,
}

impl Publisher {
    pub fn publish(&self, delivery_id: Id<Delivery>, event: ChannelEvent) -> usize {
        self.hub.publish(delivery_id, event)
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.hub
            .inner
            .publishers
            .send_modify(|count| *count = count.saturating_sub(1));
        log::info!("real-time publisher detached");
    }
}

pub struct HubSubscription {
    hub: RealtimeHub,
    events: Option<broadcast::Receiver<Envelope>>,
    connection: watch::Receiver<usize>,
    /// Last state handed out, so only changes become events.
    state: ConnectionState,
    delivery_id: Option<Id<Delivery>>,
    left: bool,
}

impl HubSubscription {
    pub fn delivery_id(&self) -> Option<Id<Delivery>> {
        self.delivery_id
    }
}

#[async_trait]
impl UpdateChannel for HubSubscription {
    async fn join(&mut self, delivery_id: Id<Delivery>) -> Result<(), ChannelError> {
        if self.left {
            return Err(ChannelError::Closed);
        }
        match self.delivery_id {
            Some(joined) if joined == delivery_id => Ok(()),
            Some(joined) => Err(ChannelError::AlreadyJoined(joined)),
            None => {
                self.delivery_id = Some(delivery_id);
                self.events = Some(self.hub.inner.events.subscribe());
                log::debug!("joined delivery {}", delivery_id);
                Ok(())
            }
        }
    }

    /// Yields nothing until a delivery was joined.
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        let delivery_id = self.delivery_id?;
        if self.left {
            return None;
        }
        let events = self.events.as_mut()?;
        loop {
            tokio::select! {
                changed = self.connection.changed() => {
                    changed.ok()?;
                    let state = ConnectionState::from(*self.connection.borrow_and_update() > 0);
                    if state != self.state {
                        self.state = state;
                        return Some(ChannelEvent::Connection(state));
                    }
                }
                received = events.recv() => match received {
                    Ok((id, event)) if id == delivery_id => return Some(event),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "subscription of delivery {} skipped {} events",
                            delivery_id,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        self.events = None;
        if let Some(delivery_id) = self.delivery_id {
            log::debug!("left delivery {}", delivery_id);
        }
    }
}
