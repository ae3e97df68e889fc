use crate::LatencyDigest;
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSecondsWithFrac, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Name of the synthetic row summing every request type.
pub const AGGREGATED: &str = "Aggregated";

/// Raw counters of one request type, as read out of the outcome recorder.
#[derive(Debug, Clone, Default)]
pub struct RequestSample {
    pub name: String,
    pub successes: u64,
    pub failures: u64,
    pub failure_causes: BTreeMap<String, u64>,
    pub latency: LatencyDigest,
}

/// Latency figures exported with each request type.
#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub min: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub max: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub mean: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p50: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p90: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p99: Duration,
}

impl From<&LatencyDigest> for LatencySummary {
    fn from(digest: &LatencyDigest) -> Self {
        Self {
            min: digest.min(),
            max: digest.max(),
            mean: digest.mean(),
            p50: digest.quantile(0.5),
            p90: digest.quantile(0.9),
            p99: digest.quantile(0.99),
        }
    }
}

/// Counts and latency distribution of a single named request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStats {
    pub name: String,
    pub successes: u64,
    pub failures: u64,
    /// Failures grouped by a short cause such as `status 500` or `timeout`.
    pub failure_causes: BTreeMap<String, u64>,
    pub latency: LatencySummary,
    #[serde(skip)]
    digest: LatencyDigest,
}

impl RequestStats {
    pub fn new(sample: RequestSample) -> Self {
        Self::with_digest(
            sample.name,
            sample.successes,
            sample.failures,
            sample.failure_causes,
            sample.latency,
        )
    }

    fn with_digest(
        name: String,
        successes: u64,
        failures: u64,
        failure_causes: BTreeMap<String, u64>,
        digest: LatencyDigest,
    ) -> Self {
        Self {
            name,
            successes,
            failures,
            failure_causes,
            latency: LatencySummary::from(&digest),
            digest,
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn failure_rate(&self) -> f64 {
        match self.total() {
            0 => 0.,
            total => self.failures as f64 / total as f64,
        }
    }

    /// Number of latency samples behind the quantiles.
    pub fn samples(&self) -> u64 {
        self.digest.len()
    }

    /// Latency at an arbitrary quantile (0.0 to 1.0).
    pub fn latency(&self, quantile: f64) -> Duration {
        self.digest.quantile(quantile)
    }

    /// Requests completed per second over `elapsed`.
    pub fn rps(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            0.
        } else {
            self.total() as f64 / elapsed.as_secs_f64()
        }
    }

    fn row(&self, f: &mut fmt::Formatter<'_>, elapsed: Duration) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>9} {:>9} ({:>5.1}%) {:>9} {:>9} {:>9} {:>9} {:>9} {:>9.2}",
            self.name,
            self.total(),
            self.failures,
            self.failure_rate() * 100.,
            self.latency.p50.as_millis(),
            self.latency.p90.as_millis(),
            self.latency.p99.as_millis(),
            self.latency.min.as_millis(),
            self.latency.max.as_millis(),
            self.rps(elapsed),
        )
    }
}

impl fmt::Display for RequestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success={}, Failure={}, ErrorRate={:.2}, p50={:?}, p90={:?}, p99={:?}",
            self.successes,
            self.failures,
            self.failure_rate(),
            self.latency.p50,
            self.latency.p90,
            self.latency.p99,
        )
    }
}

/// Point-in-time statistics of a run, keyed by request name.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStats {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    pub requests: BTreeMap<String, RequestStats>,
    pub aggregated: RequestStats,
}

impl AggregateStats {
    /// Builds the stats of a run from per-name samples and the latency digest of every request.
    ///
    /// A t-digest cannot be merged, so the aggregated distribution is passed in rather than
    /// derived from the per-name digests.
    pub fn from_samples(
        elapsed: Duration,
        samples: Vec<RequestSample>,
        latency: LatencyDigest,
    ) -> Self {
        let mut successes = 0;
        let mut failures = 0;
        let mut causes = BTreeMap::new();
        let mut requests = BTreeMap::new();

        for sample in samples {
            successes += sample.successes;
            failures += sample.failures;
            for (cause, count) in &sample.failure_causes {
                *causes
                    .entry(format!("{}: {cause}", sample.name))
                    .or_insert(0) += count;
            }
            requests.insert(sample.name.clone(), RequestStats::new(sample));
        }

        Self {
            elapsed,
            requests,
            aggregated: RequestStats::with_digest(
                AGGREGATED.to_string(),
                successes,
                failures,
                causes,
                latency,
            ),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RequestStats> {
        self.requests.get(name)
    }

    /// Successful outcomes recorded for `name`; zero for a name never seen.
    pub fn successes(&self, name: &str) -> u64 {
        self.get(name).map_or(0, |stats| stats.successes)
    }

    /// Failed outcomes recorded for `name`; zero for a name never seen.
    pub fn failures(&self, name: &str) -> u64 {
        self.get(name).map_or(0, |stats| stats.failures)
    }

    pub fn total(&self) -> u64 {
        self.aggregated.total()
    }
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::from_samples(Duration::ZERO, vec![], LatencyDigest::new())
    }
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>9} {:>18} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "Name", "# reqs", "# fails", "Median", "90%ile", "99%ile", "Min", "Max", "req/s",
        )?;
        writeln!(f, "{}", "-".repeat(124))?;
        for stats in self.requests.values() {
            stats.row(f, self.elapsed)?;
        }
        writeln!(f, "{}", "-".repeat(124))?;
        self.aggregated.row(f, self.elapsed)?;
        writeln!(f, "Latencies in ms over {}", humantime::format_duration(self.elapsed))?;

        if !self.aggregated.failure_causes.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:>9}  Failure", "# occ")?;
            for (cause, count) in &self.aggregated.failure_causes {
                writeln!(f, "{count:>9}  {cause}")?;
            }
        }

        Ok(())
    }
}
