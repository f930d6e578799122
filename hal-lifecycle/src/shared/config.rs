use hal_core::timeouts::POLL_INTERVAL_MILLIS;
use hal_dispatch::http::DEFAULT_ENDPOINT;
use hal_dispatch::HttpDispatcherConfig;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const MAX_TIMEOUT_SCALE: f64 = 1000.0;

/// Runtime settings of the lifecycle services.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub management_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Multiplier applied to every verification budget.
    pub timeout_scale: f64,
    pub event_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            management_url: DEFAULT_ENDPOINT.to_string(),
            username: None,
            password: None,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MILLIS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            timeout_scale: 1.0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let poll_interval_ms: u64 = parse_or(
            "HAL_POLL_INTERVAL_MS",
            non_empty("HAL_POLL_INTERVAL_MS"),
            POLL_INTERVAL_MILLIS,
        );
        let request_timeout_secs: u64 = parse_or(
            "HAL_REQUEST_TIMEOUT_SECS",
            non_empty("HAL_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        );
        let mut timeout_scale: f64 =
            parse_or("HAL_TIMEOUT_SCALE", non_empty("HAL_TIMEOUT_SCALE"), 1.0);
        if !timeout_scale.is_finite() || timeout_scale <= 0.0 {
            warn!(value = timeout_scale, "HAL_TIMEOUT_SCALE must be positive, using 1.0");
            timeout_scale = 1.0;
        } else if timeout_scale > MAX_TIMEOUT_SCALE {
            warn!(
                value = timeout_scale,
                max = MAX_TIMEOUT_SCALE,
                "HAL_TIMEOUT_SCALE too large, capping"
            );
            timeout_scale = MAX_TIMEOUT_SCALE;
        }

        Self {
            management_url: non_empty("HAL_MANAGEMENT_URL").unwrap_or(defaults.management_url),
            username: non_empty("HAL_USERNAME"),
            password: non_empty("HAL_PASSWORD"),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            request_timeout: Duration::from_secs(request_timeout_secs),
            timeout_scale,
            event_capacity: defaults.event_capacity,
        }
    }

    /// Verification budget for `seconds`, scaled. Saturates instead of overflowing.
    pub fn budget(&self, seconds: u64) -> Duration {
        let scaled = seconds as f64 * self.timeout_scale;
        Duration::try_from_secs_f64(scaled).unwrap_or_else(|_| {
            if scaled > 0.0 {
                Duration::MAX
            } else {
                Duration::from_secs(seconds)
            }
        })
    }

    pub fn dispatcher_config(&self) -> HttpDispatcherConfig {
        HttpDispatcherConfig {
            endpoint: self.management_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparsable setting");
            default
        }),
    }
}
