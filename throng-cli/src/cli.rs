use clap::builder::BoolishValueParser;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use throng::core::{RunConfig, ThinkTime, DEFAULT_RAMP_RATE, DEFAULT_USERS};

#[derive(Parser, Debug)]
#[command(version, about = "Simulate users hammering the timestamp API")]
pub struct Cli {
    /// Base URL of the API under test.
    #[arg(long, env = "THRONG_HOST")]
    pub host: String,

    /// Peak number of simulated users.
    #[arg(short, long, default_value_t = DEFAULT_USERS)]
    pub users: usize,

    /// Users started per second while ramping up.
    #[arg(short('r'), long, default_value_t = DEFAULT_RAMP_RATE)]
    pub spawn_rate: f64,

    /// How long to run, e.g. `90s` or `5m`.
    #[arg(short('t'), long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub run_time: Duration,

    /// Per-request timeout.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "90s")]
    pub timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub think_min: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "3s")]
    pub think_max: Duration,

    /// Makes think times and payloads reproducible.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Interval between progress lines; `0s` disables them.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub report_interval: Duration,

    /// Per-request debug/error logging.
    #[arg(
        long,
        env = "ENABLE_LOGGING",
        value_parser = BoolishValueParser::new(),
        default_value_t = true,
        action = clap::ArgAction::Set,
    )]
    pub enable_logging: bool,

    /// Print the final statistics as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Serve Prometheus metrics on this address while the run is going.
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}

impl Cli {
    pub fn config(&self) -> RunConfig {
        let config = RunConfig::new(&self.host)
            .users(self.users)
            .ramp_rate(self.spawn_rate)
            .duration(self.run_time)
            .timeout(self.timeout)
            .think_time(ThinkTime::between(self.think_min, self.think_max))
            .report_interval(self.report_interval)
            .logging(self.enable_logging);

        match self.seed {
            Some(seed) => config.seed(seed),
            None => config,
        }
    }
}
