//! Thread-safe tally of request outcomes, shared by every simulated user of a run.
use crate::outcome::RequestOutcome;
use arc_swap::ArcSwap;
use metrics_util::AtomicBucket;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use throng_core::{AggregateStats, LatencyDigest, RequestSample};

#[cfg(feature = "metrics")]
const LATENCY_METRIC: &str = "throng_request_latency_seconds";
#[cfg(feature = "metrics")]
const REQUESTS_METRIC: &str = "throng_requests_total";

type Entries = HashMap<Arc<str>, Arc<RequestCounters>>;

/// Accumulates [`RequestOutcome`]s per request name.
///
/// Cloning is cheap and every clone records into the same tally. Counters are lock-free; the
/// name table is copied only the first time a name is seen. Latencies are buffered lock-free and
/// folded into t-digests whenever a snapshot is taken, so memory stays bounded for long runs.
#[derive(Clone)]
pub struct OutcomeRecorder {
    inner: Arc<Inner>,
}

struct Inner {
    started: Instant,
    entries: ArcSwap<Entries>,
    /// Every drained latency, regardless of name. Also serializes snapshots.
    latency: Mutex<LatencyDigest>,
}

struct RequestCounters {
    success: AtomicU64,
    failure: AtomicU64,
    latency: AtomicBucket<Duration>,
    digest: Mutex<LatencyDigest>,
    causes: Mutex<HashMap<String, u64>>,
}

impl RequestCounters {
    fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            latency: AtomicBucket::new(),
            digest: Mutex::new(LatencyDigest::new()),
            causes: Mutex::new(HashMap::new()),
        }
    }

    /// Drains buffered latencies into this name's digest and into `total`.
    fn sample(&self, name: &str, total: &mut LatencyDigest) -> RequestSample {
        let mut digest = self.digest.lock().unwrap_or_else(PoisonError::into_inner);
        self.latency.clear_with(|chunk| {
            digest.extend(chunk);
            total.extend(chunk);
        });

        let failure_causes = self
            .causes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(cause, count)| (cause.clone(), *count))
            .collect::<BTreeMap<_, _>>();

        RequestSample {
            name: name.to_string(),
            successes: self.success.load(Ordering::Acquire),
            failures: self.failure.load(Ordering::Acquire),
            failure_causes,
            latency: digest.clone(),
        }
    }
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        {
            metrics::describe_histogram!(
                LATENCY_METRIC,
                metrics::Unit::Seconds,
                "Wall-clock latency of each simulated request."
            );
            metrics::describe_counter!(REQUESTS_METRIC, "Simulated requests by outcome.");
        }

        Self {
            inner: Arc::new(Inner {
                started: Instant::now(),
                entries: ArcSwap::from_pointee(HashMap::new()),
                latency: Mutex::new(LatencyDigest::new()),
            }),
        }
    }

    pub fn record(&self, outcome: RequestOutcome) {
        let counters = self.counters(&outcome.name);

        match &outcome.error {
            None => {
                counters.success.fetch_add(1, Ordering::AcqRel);
            }
            Some(cause) => {
                *counters
                    .causes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(cause.key())
                    .or_insert(0) += 1;
                counters.failure.fetch_add(1, Ordering::AcqRel);
            }
        }
        // After the count, so a snapshot never holds more latencies than outcomes.
        counters.latency.push(outcome.elapsed);

        #[cfg(feature = "metrics")]
        {
            let result = if outcome.is_success() { "success" } else { "failure" };
            metrics::histogram!(LATENCY_METRIC, "request" => outcome.name.to_string())
                .record(outcome.elapsed.as_secs_f64());
            metrics::counter!(
                REQUESTS_METRIC,
                "request" => outcome.name.to_string(),
                "result" => result
            )
            .increment(1);
        }
    }

    /// Copy of the current tally, measured against the recorder's own clock.
    pub fn snapshot(&self) -> AggregateStats {
        self.snapshot_with_elapsed(self.inner.started.elapsed())
    }

    /// Copy of the current tally, reporting `elapsed` as the run time.
    ///
    /// While users are still recording, a request may show up in its counts before its latency
    /// does. Once every user has stopped the two agree exactly.
    pub fn snapshot_with_elapsed(&self, elapsed: Duration) -> AggregateStats {
        let mut total = self
            .inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = self.inner.entries.load();
        let samples = entries
            .iter()
            .map(|(name, counters)| counters.sample(name, &mut total))
            .collect();
        AggregateStats::from_samples(elapsed, samples, total.clone())
    }

    fn counters(&self, name: &Arc<str>) -> Arc<RequestCounters> {
        loop {
            if let Some(counters) = self.inner.entries.load().get(name) {
                return Arc::clone(counters);
            }

            self.inner.entries.rcu(|entries| {
                let mut entries = Entries::clone(entries);
                entries
                    .entry(Arc::clone(name))
                    .or_insert_with(|| Arc::new(RequestCounters::new()));
                entries
            });
        }
    }
}

impl Default for OutcomeRecorder {
    fn default() -> Self {
        Self::new()
    }
}
