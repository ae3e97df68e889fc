use crate::{
    ConfigError, DEFAULT_DURATION, DEFAULT_RAMP_RATE, DEFAULT_REPORT_INTERVAL, DEFAULT_THINK_MAX,
    DEFAULT_THINK_MIN, DEFAULT_TIMEOUT, DEFAULT_USERS,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Bounds of the uniformly distributed pause a simulated user takes before every request.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTime {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub min: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub max: Duration,
}

impl ThinkTime {
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No pause at all; users fire their next request as soon as the previous one finishes.
    pub fn none() -> Self {
        Self::between(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_none(&self) -> bool {
        self.max.is_zero()
    }
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::between(DEFAULT_THINK_MIN, DEFAULT_THINK_MAX)
    }
}

impl fmt::Display for ThinkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            humantime::format_duration(self.min),
            humantime::format_duration(self.max)
        )
    }
}

/// Diagnostics toggle handed to the engine at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    /// Emit a log line for every request sent and every failure seen.
    pub enabled: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Everything a load test needs to know before it starts. Immutable once the run begins.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base URL of the API under test, e.g. `https://api.example.com/`.
    pub host: String,
    /// Number of simulated users to ramp up to.
    pub users: usize,
    /// Users spawned per second while ramping.
    pub ramp_rate: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub duration: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,
    pub think_time: ThinkTime,
    /// Seed for every user's private RNG. Users draw from independent entropy when unset.
    pub seed: Option<u64>,
    /// Interval between progress log lines. Zero disables them.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub report_interval: Duration,
    pub logging: LogOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            users: DEFAULT_USERS,
            ramp_rate: DEFAULT_RAMP_RATE,
            duration: DEFAULT_DURATION,
            timeout: DEFAULT_TIMEOUT,
            think_time: ThinkTime::default(),
            seed: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            logging: LogOptions::default(),
        }
    }
}

impl RunConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    pub fn users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    pub fn ramp_rate(mut self, ramp_rate: f64) -> Self {
        self.ramp_rate = ramp_rate;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = report_interval;
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging.enabled = enabled;
        self
    }

    /// Checks every field and returns the normalized base URL of the target host.
    ///
    /// The returned URL always ends in `/` so request paths resolve beneath any base path the
    /// host carries.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }

        if self.ramp_interval().is_none() {
            return Err(ConfigError::InvalidRampRate(self.ramp_rate));
        }

        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if self.think_time.min > self.think_time.max {
            return Err(ConfigError::InvertedThinkTime {
                min: self.think_time.min,
                max: self.think_time.max,
            });
        }

        base_url(&self.host)
    }

    /// Time between two user spawns while ramping, or `None` if the ramp rate is unusable.
    pub fn ramp_interval(&self) -> Option<Duration> {
        if !self.ramp_rate.is_finite() || self.ramp_rate <= 0. {
            return None;
        }
        Duration::try_from_secs_f64(1. / self.ramp_rate).ok()
    }
}

fn base_url(host: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidHost {
        host: host.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(host.trim()).map_err(|err| invalid(&err.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https hosts are supported"));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host name"));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
