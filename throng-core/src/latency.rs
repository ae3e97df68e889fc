use pdatastructs::tdigest::{TDigest, K1};
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Latency distribution of one request type.
///
/// Quantiles come from a t-digest, which cannot be merged, so every sample must be pushed into
/// each digest that should reflect it. Exact min/max/mean are tracked alongside it.
#[derive(Debug, Clone)]
pub struct LatencyDigest {
    latency: TDigest<K1>,
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyDigest {
    pub fn new() -> Self {
        Self {
            latency: default_tdigest(),
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    pub fn from_samples(samples: &[Duration]) -> Self {
        let mut digest = Self::new();
        digest.extend(samples);
        digest
    }

    pub fn push(&mut self, latency: Duration) {
        self.latency.insert(latency.as_secs_f64());
        self.count += 1;
        self.total = self.total.saturating_add(latency);
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
    }

    pub fn extend(&mut self, samples: &[Duration]) {
        for latency in samples {
            self.push(*latency);
        }
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Duration {
        if self.is_empty() {
            Duration::ZERO
        } else {
            self.min
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }

    /// Latency at `quantile` (0.0 to 1.0). Zero when no samples were recorded.
    pub fn quantile(&self, quantile: f64) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile.clamp(0., 1.));

        // TDigest occasionally answers NaN on sparse inputs.
        if secs.is_finite() && secs >= 0. {
            Duration::from_secs_f64(secs).clamp(self.min, self.max)
        } else {
            error!("Non-finite latency quantile {quantile}; reporting the maximum instead.");
            self.max
        }
    }
}

impl Default for LatencyDigest {
    fn default() -> Self {
        Self::new()
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
