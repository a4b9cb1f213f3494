//! Device positioning.
//!
//! The platform positioning API is hidden behind [`PositionProvider`]. A
//! [`GeolocationSource`] turns a provider into a bounded watch: one immediate
//! fix, then periodic fixes until the watch is stopped or its time limit is
//! reached. Results are handed to a [`PositionSink`].

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::coordinate::Coordinate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum GeolocationError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl GeolocationError {
    /// Errors that will not go away by asking again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

impl fmt::Display for GeolocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "Location access was denied"),
            Self::PositionUnavailable => write!(f, "Your position is currently unavailable"),
            Self::Timeout => write!(f, "Locating your device took too long"),
        }
    }
}

impl std::error::Error for GeolocationError {}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub coordinate: Coordinate,
    /// Accuracy radius in meters, if the device reports one.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or_default()
    }
}

/// Options for a single position request.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// A cached fix younger than this may be returned.
    pub maximum_age: Duration,
}

#[async_trait]
pub trait PositionProvider: Send + Sync + 'static {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, GeolocationError>;
}

/// Receives the results of a watch.
#[async_trait]
pub trait PositionSink: Send + Sync + 'static {
    async fn on_position(&self, position: Position);
    async fn on_error(&self, error: GeolocationError);
}

/// Shorter poll intervals are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Timeout of the first request.
    pub immediate_timeout: Duration,
    /// Timeout of every following request.
    pub watch_timeout: Duration,
    pub maximum_age: Duration,
    pub poll_interval: Duration,
    /// The watch stops by itself after this long. Keeps the location hardware
    /// from running forever when nobody stops the watch.
    pub max_watch_duration: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            immediate_timeout: Duration::from_secs(10),
            watch_timeout: Duration::from_secs(27),
            maximum_age: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            max_watch_duration: Some(Duration::from_secs(5 * 60)),
        }
    }
}

impl WatchOptions {
    fn immediate(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: self.enable_high_accuracy,
            timeout: self.immediate_timeout,
            maximum_age: self.maximum_age,
        }
    }

    fn continuous(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: self.enable_high_accuracy,
            timeout: self.watch_timeout,
            maximum_age: self.maximum_age,
        }
    }
}

/// Handle of a running watch. Cheap to clone; all clones control the same watch.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    cancel: CancellationToken,
    done: CancellationToken,
}

impl WatchHandle {
    /// Stops the watch. Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the watch is still polling the provider.
    pub fn is_active(&self) -> bool {
        !self.done.is_cancelled()
    }

    /// Waits until the watch has ended, for whatever reason.
    pub async fn stopped(&self) {
        self.done.cancelled().await
    }
}

#[derive(Clone)]
pub struct GeolocationSource {
    provider: Arc<dyn PositionProvider>,
    options: WatchOptions,
}

impl GeolocationSource {
    pub fn new(provider: Arc<dyn PositionProvider>, options: WatchOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Starts a new watch reporting to `sink`.
    pub fn start<S: PositionSink>(&self, sink: S) -> WatchHandle {
        let handle = WatchHandle {
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        };
        tokio::spawn(watch(
            self.provider.clone(),
            sink,
            self.options.clone(),
            handle.clone(),
        ));
        handle
    }

    pub fn stop(&self, handle: &WatchHandle) {
        handle.stop()
    }
}

async fn watch<S: PositionSink>(
    provider: Arc<dyn PositionProvider>,
    sink: S,
    options: WatchOptions,
    handle: WatchHandle,
) {
    let _done = handle.done.clone().drop_guard();
    let deadline = options
        .max_watch_duration
        .map(|limit| Instant::now() + limit);

    let polling = async {
        if !request(provider.as_ref(), &sink, &options.immediate()).await {
            return;
        }
        let mut interval = time::interval(options.poll_interval.max(MIN_POLL_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;
        let continuous = options.continuous();
        loop {
            interval.tick().await;
            if !request(provider.as_ref(), &sink, &continuous).await {
                return;
            }
        }
    };

    let time_limit = async {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => futures::future::pending().await,
        }
    };

    tokio::select! {
        _ = handle.cancel.cancelled() => {
            log::debug!("geolocation watch stopped");
        }
        _ = time_limit => {
            log::info!("geolocation watch reached its time limit");
        }
        _ = polling => {
            log::info!("geolocation watch ended after a fatal error");
        }
    }
}

/// Asks the provider once. Returns whether the watch should go on.
async fn request<S: PositionSink>(
    provider: &dyn PositionProvider,
    sink: &S,
    options: &PositionOptions,
) -> bool {
    match time::timeout(options.timeout, provider.current_position(options)).await {
        Ok(Ok(position)) => {
            sink.on_position(position).await;
            true
        }
        Ok(Err(error)) => {
            log::warn!("geolocation request failed: {}", error);
            sink.on_error(error).await;
            !error.is_fatal()
        }
        Err(_) => {
            log::warn!("geolocation request timed out after {:?}", options.timeout);
            sink.on_error(GeolocationError::Timeout).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Answers with the scripted results, then with `PositionUnavailable`.
    struct ScriptedProvider {
        results: Mutex<Vec<Result<Position, GeolocationError>>>,
        requests: Mutex<Vec<PositionOptions>>,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(mut results: Vec<Result<Position, GeolocationError>>, delay: Duration) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                requests: Mutex::new(vec![]),
                delay,
            }
        }
    }

    #[async_trait]
    impl PositionProvider for ScriptedProvider {
        async fn current_position(
            &self,
            options: &PositionOptions,
        ) -> Result<Position, GeolocationError> {
            self.requests.lock().unwrap().push(options.clone());
            time::sleep(self.delay).await;
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(GeolocationError::PositionUnavailable))
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        events: Arc<Mutex<Vec<Result<Coordinate, GeolocationError>>>>,
    }

    #[async_trait]
    impl PositionSink for Recorder {
        async fn on_position(&self, position: Position) {
            self.events.lock().unwrap().push(Ok(position.coordinate));
        }

        async fn on_error(&self, error: GeolocationError) {
            self.events.lock().unwrap().push(Err(error));
        }
    }

    fn fix(lat: f64) -> Result<Position, GeolocationError> {
        Ok(Position::new(Coordinate::new(lat, 0.0).unwrap()))
    }

    fn options() -> WatchOptions {
        WatchOptions {
            poll_interval: Duration::from_secs(1),
            ..WatchOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_positions_in_request_order() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![fix(1.0), fix(2.0), fix(3.0)],
            Duration::ZERO,
        ));
        let source = GeolocationSource::new(provider.clone(), options());
        let recorder = Recorder::default();
        let handle = source.start(recorder.clone());

        time::sleep(Duration::from_millis(2500)).await;
        handle.stop();
        handle.stopped().await;

        let events = recorder.events.lock().unwrap().clone();
        let coordinates = events
            .iter()
            .filter_map(|event| event.as_ref().ok().map(|c| c.lat))
            .collect::<Vec<_>>();
        assert_eq!(coordinates, vec![1.0, 2.0, 3.0]);

        let requests = provider.requests.lock().unwrap().clone();
        assert_eq!(requests[0].timeout, Duration::from_secs(10));
        assert_eq!(requests[1].timeout, Duration::from_secs(27));
        assert!(requests.iter().all(|request| request.enable_high_accuracy));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_and_watch_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![], Duration::from_secs(60)));
        let source = GeolocationSource::new(provider, options());
        let recorder = Recorder::default();
        let handle = source.start(recorder.clone());

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(
            recorder.events.lock().unwrap().first(),
            Some(&Err(GeolocationError::Timeout))
        );
        assert!(handle.is_active());
        handle.stop();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_ends_the_watch() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Err(GeolocationError::PermissionDenied)],
            Duration::ZERO,
        ));
        let source = GeolocationSource::new(provider.clone(), options());
        let recorder = Recorder::default();
        let handle = source.start(recorder.clone());

        handle.stopped().await;
        assert!(!handle.is_active());
        assert_eq!(
            recorder.events.lock().unwrap().clone(),
            vec![Err(GeolocationError::PermissionDenied)]
        );
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_at_its_time_limit() {
        let provider = Arc::new(ScriptedProvider::new(vec![], Duration::ZERO));
        let source = GeolocationSource::new(
            provider.clone(),
            WatchOptions {
                max_watch_duration: Some(Duration::from_secs(30)),
                ..options()
            },
        );
        let handle = source.start(Recorder::default());

        time::sleep(Duration::from_secs(29)).await;
        assert!(handle.is_active());
        time::sleep(Duration::from_secs(2)).await;
        handle.stopped().await;
        assert!(!handle.is_active());

        let requests = provider.requests.lock().unwrap().len();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.requests.lock().unwrap().len(), requests);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_keeps_polling() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![fix(1.0), fix(2.0), fix(3.0)],
            Duration::ZERO,
        ));
        let source = GeolocationSource::new(
            provider.clone(),
            WatchOptions {
                poll_interval: Duration::ZERO,
                ..options()
            },
        );
        let recorder = Recorder::default();
        let handle = source.start(recorder.clone());

        time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_active());
        assert!(provider.requests.lock().unwrap().len() >= 3);
        handle.stop();
        handle.stopped().await;
        assert_eq!(
            recorder.events.lock().unwrap()[..3],
            [
                Ok(Coordinate::new(1.0, 0.0).unwrap()),
                Ok(Coordinate::new(2.0, 0.0).unwrap()),
                Ok(Coordinate::new(3.0, 0.0).unwrap()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_twice_is_harmless() {
        let provider = Arc::new(ScriptedProvider::new(vec![fix(1.0)], Duration::ZERO));
        let source = GeolocationSource::new(provider, options());
        let handle = source.start(Recorder::default());

        source.stop(&handle);
        source.stop(&handle);
        handle.stopped().await;
        handle.stop();
        assert!(!handle.is_active());
    }
}
