use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::geolocation::{GeolocationError, Position, PositionOptions, PositionProvider};

/// The latest report of the device, numbered in push order.
#[derive(Debug, Clone, Default)]
struct Reading {
    sequence: u64,
    value: Option<Result<Position, GeolocationError>>,
}

/// A provider fed from the outside, e.g. by a browser posting the fixes of
/// its own geolocation watch. Every pushed fix is handed out once.
pub struct PushedPositionProvider {
    latest: watch::Sender<Reading>,
    /// Sequence of the last fix handed out.
    served: AtomicU64,
}

impl Default for PushedPositionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PushedPositionProvider {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(Reading::default());
        Self {
            latest,
            served: AtomicU64::new(0),
        }
    }

    pub fn push(&self, position: Position) {
        self.replace(Ok(position));
    }

    pub fn push_error(&self, error: GeolocationError) {
        self.replace(Err(error));
    }

    fn replace(&self, value: Result<Position, GeolocationError>) {
        self.latest.send_modify(|reading| {
            reading.sequence += 1;
            reading.value = Some(value);
        });
    }

    pub fn latest(&self) -> Option<Position> {
        self.latest
            .borrow()
            .value
            .as_ref()
            .and_then(|value| value.as_ref().ok().cloned())
    }
}

#[async_trait]
impl PositionProvider for PushedPositionProvider {
    /// Returns the latest fix if it is recent enough and was not handed out
    /// before, otherwise waits for the next one. The caller bounds the wait.
    /// A pushed error is reported until the device reports something else.
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, GeolocationError> {
        let mut readings = self.latest.subscribe();
        loop {
            {
                let reading = readings.borrow_and_update();
                match reading.value.as_ref() {
                    Some(Ok(position))
                        if position.age() <= options.maximum_age
                            && self.served.fetch_max(reading.sequence, Ordering::SeqCst)
                                < reading.sequence =>
                    {
                        return Ok(position.clone());
                    }
                    Some(Err(error)) => return Err(*error),
                    _ => {}
                }
            }
            if readings.changed().await.is_err() {
                return Err(GeolocationError::PositionUnavailable);
            }
        }
    }
}
