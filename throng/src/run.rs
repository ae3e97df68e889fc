//! Run controller: starts the pool, waits out the configured duration (or an external shutdown),
//! stops every user and hands back the final tally.
use crate::error::RunError;
use crate::pool::{PoolMonitor, UserPool};
use crate::recorder::OutcomeRecorder;
use crate::scenario::Scenario;
use crate::timer::Timer;
use crate::transport::{HttpTransport, Transport};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use throng_core::{AggregateStats, RunConfig};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A single load run.
///
/// Build one with [`Run::new`], optionally attach a scenario or a shutdown signal, then `.await`
/// it:
///
/// ```no_run
/// # use throng::prelude::*;
/// # use std::time::Duration;
/// # async fn demo() -> Result<(), RunError> {
/// let config = RunConfig::new("http://localhost:3002").users(5);
/// let stats = Run::new(config)
///     .shutdown_on(tokio::time::sleep(Duration::from_secs(30)))
///     .await?;
/// println!("{stats}");
/// # Ok(())
/// # }
/// ```
pub struct Run<T = HttpTransport> {
    config: RunConfig,
    scenario: Scenario,
    transport: Result<T, RunError>,
    recorder: OutcomeRecorder,
    pool: UserPool,
    shutdown: Option<ShutdownSignal>,
}

impl Run<HttpTransport> {
    /// A run against `config.host` over HTTP. Configuration errors surface when awaited.
    pub fn new(config: RunConfig) -> Self {
        let transport = HttpTransport::from_config(&config);
        Self::build(config, transport)
    }
}

impl<T> Run<T>
where
    T: Transport + Sync + 'static,
{
    pub fn with_transport(config: RunConfig, transport: T) -> Self {
        Self::build(config, Ok(transport))
    }

    fn build(config: RunConfig, transport: Result<T, RunError>) -> Self {
        let recorder = OutcomeRecorder::new();
        Self {
            config,
            scenario: Scenario::timestamp_api(),
            transport,
            pool: UserPool::new(recorder.clone()),
            recorder,
            shutdown: None,
        }
    }

    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    /// Ends the run early once `signal` resolves.
    pub fn shutdown_on<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    pub fn monitor(&self) -> PoolMonitor {
        self.pool.monitor()
    }

    pub fn recorder(&self) -> OutcomeRecorder {
        self.recorder.clone()
    }

    #[instrument(name = "run", skip_all, fields(host = %self.config.host, users = self.config.users))]
    async fn execute(mut self) -> Result<AggregateStats, RunError> {
        let transport = Arc::new(self.transport?);
        let started = Instant::now();
        self.pool
            .start(&self.config, self.scenario.clone(), transport)?;

        info!(
            "Running {} users against {} for {}",
            self.config.users,
            self.config.host,
            humantime::format_duration(self.config.duration)
        );

        let deadline = tokio::time::sleep(self.config.duration);
        tokio::pin!(deadline);
        let mut shutdown = self
            .shutdown
            .take()
            .unwrap_or_else(|| Box::pin(std::future::pending()));
        let mut progress = if self.config.report_interval.is_zero() {
            None
        } else {
            Some(Timer::new(self.config.report_interval).await)
        };
        let monitor = self.pool.monitor();

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("Run time of {} elapsed", humantime::format_duration(self.config.duration));
                    break;
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping early");
                    break;
                }
                _ = tick(&mut progress) => {
                    report_progress(&self.recorder, &monitor, started.elapsed());
                }
            }
        }

        self.pool.stop().await?;
        let stats = self.recorder.snapshot_with_elapsed(started.elapsed());
        info!(
            "Run finished after {}: {} requests, {} failures",
            humantime::format_duration(round(stats.elapsed)),
            stats.total(),
            stats.aggregated.failures
        );
        Ok(stats)
    }
}

impl<T> IntoFuture for Run<T>
where
    T: Transport + Sync + 'static,
{
    type Output = Result<AggregateStats, RunError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// Runs the timestamp API scenario against `config.host` and returns the final tally.
pub async fn run(config: RunConfig) -> Result<AggregateStats, RunError> {
    Run::new(config).await
}

/// Like [`run`], over a caller-supplied transport.
pub async fn run_with<T>(config: RunConfig, transport: T) -> Result<AggregateStats, RunError>
where
    T: Transport + Sync + 'static,
{
    Run::with_transport(config, transport).await
}

async fn tick(timer: &mut Option<Timer>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn report_progress(recorder: &OutcomeRecorder, monitor: &PoolMonitor, elapsed: Duration) {
    let stats = recorder.snapshot_with_elapsed(elapsed);
    info!(
        "{} users running ({:?}), {} requests in {}",
        monitor.running_users(),
        monitor.state(),
        stats.total(),
        humantime::format_duration(round(elapsed))
    );
    for request in stats.requests.values() {
        info!("{}: {request}", request.name);
    }
}

fn round(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
