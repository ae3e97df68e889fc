use std::time::Duration;

/// Number of simulated users when none is configured.
pub const DEFAULT_USERS: usize = 10;

/// Users spawned per second while ramping up.
pub const DEFAULT_RAMP_RATE: f64 = 2.;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

/// Per-request timeout applied by the HTTP transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Lower bound of the pause a user takes before each request.
pub const DEFAULT_THINK_MIN: Duration = Duration::from_secs(1);

/// Upper bound of the pause a user takes before each request.
pub const DEFAULT_THINK_MAX: Duration = Duration::from_secs(3);

/// How often a running load test logs its intermediate statistics.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);
