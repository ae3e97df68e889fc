use std::time::Duration;
use thiserror::Error;

/// Problems found while validating a [`RunConfig`](crate::RunConfig). Any of these stops a run
/// before a single user is spawned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid target host \"{host}\": {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("Target user count must be at least 1")]
    NoUsers,

    #[error("Ramp rate must be a positive, finite number of users per second (got {0})")]
    InvalidRampRate(f64),

    #[error("Run duration must be greater than zero")]
    ZeroDuration,

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Think time minimum ({min:?}) is greater than its maximum ({max:?})")]
    InvertedThinkTime { min: Duration, max: Duration },
}
