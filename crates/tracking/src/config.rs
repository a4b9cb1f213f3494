use std::{env, str::FromStr, time::Duration};

use utility::geo::DEFAULT_AVERAGE_SPEED_KMH;

use crate::{geolocation::WatchOptions, map::DEFAULT_TILE_URL};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub watch: WatchOptions,
    /// Speed of the linear ETA model.
    pub average_speed_kmh: f64,
    pub tile_url: String,
    /// Number of channel messages kept for display.
    pub notification_limit: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            watch: WatchOptions::default(),
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            tile_url: DEFAULT_TILE_URL.to_owned(),
            notification_limit: 20,
        }
    }
}

impl TrackingConfig {
    /// Reads overrides from the environment. Unset or unparsable variables
    /// keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let watch = WatchOptions {
            enable_high_accuracy: var("TRACKING_HIGH_ACCURACY")
                .unwrap_or(defaults.watch.enable_high_accuracy),
            immediate_timeout: nonzero_millis("TRACKING_IMMEDIATE_TIMEOUT_MS")
                .unwrap_or(defaults.watch.immediate_timeout),
            watch_timeout: nonzero_millis("TRACKING_WATCH_TIMEOUT_MS")
                .unwrap_or(defaults.watch.watch_timeout),
            maximum_age: millis("TRACKING_MAXIMUM_AGE_MS")
                .unwrap_or(defaults.watch.maximum_age),
            poll_interval: nonzero_millis("TRACKING_POLL_INTERVAL_MS")
                .unwrap_or(defaults.watch.poll_interval),
            // zero disables the limit
            max_watch_duration: match var::<u64>("TRACKING_MAX_WATCH_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.watch.max_watch_duration,
            },
        };
        Self {
            watch,
            average_speed_kmh: var("TRACKING_AVERAGE_SPEED_KMH")
                .filter(|speed: &f64| speed.is_finite() && *speed > 0.0)
                .unwrap_or(defaults.average_speed_kmh),
            tile_url: env::var("TRACKING_TILE_URL").unwrap_or(defaults.tile_url),
            notification_limit: var("TRACKING_NOTIFICATION_LIMIT")
                .unwrap_or(defaults.notification_limit),
        }
    }
}

fn var<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        log::warn!("ignoring unparsable value `{}` of {}", value, name);
    }
    parsed
}

fn millis(name: &str) -> Option<Duration> {
    var(name).map(Duration::from_millis)
}

fn nonzero_millis(name: &str) -> Option<Duration> {
    let duration = millis(name)?;
    if duration.is_zero() {
        log::warn!("ignoring zero {}", name);
        return None;
    }
    Some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_watch_policy() {
        let config = TrackingConfig::default();
        assert_eq!(config.watch.immediate_timeout, Duration::from_secs(10));
        assert_eq!(config.watch.watch_timeout, Duration::from_secs(27));
        assert_eq!(config.watch.max_watch_duration, Some(Duration::from_secs(300)));
        assert_eq!(config.average_speed_kmh, 25.0);
    }

    // Every variable is touched by this test only, so parallel tests do not race.
    #[test]
    fn environment_overrides() {
        env::set_var("TRACKING_MAX_WATCH_SECS", "0");
        env::set_var("TRACKING_AVERAGE_SPEED_KMH", "-3");
        env::set_var("TRACKING_POLL_INTERVAL_MS", "1500");
        env::set_var("TRACKING_HIGH_ACCURACY", "false");
        let config = TrackingConfig::from_env();
        assert_eq!(config.watch.max_watch_duration, None);
        assert_eq!(config.average_speed_kmh, 25.0);
        assert_eq!(config.watch.poll_interval, Duration::from_millis(1500));
        assert!(!config.watch.enable_high_accuracy);

        env::set_var("TRACKING_POLL_INTERVAL_MS", "0");
        env::set_var("TRACKING_WATCH_TIMEOUT_MS", "0");
        let config = TrackingConfig::from_env();
        assert_eq!(config.watch.poll_interval, Duration::from_secs(5));
        assert_eq!(config.watch.watch_timeout, Duration::from_secs(27));

        for name in [
            "TRACKING_WATCH_TIMEOUT_MS",
            "TRACKING_MAX_WATCH_SECS",
            "TRACKING_AVERAGE_SPEED_KMH",
            "TRACKING_POLL_INTERVAL_MS",
            "TRACKING_HIGH_ACCURACY",
        ] {
            env::remove_var(name);
        }
    }
}
