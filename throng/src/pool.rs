//! User pool scheduler: ramps simulated users up to the target count, keeps track of them, and
//! winds them all down on `stop()`.
use crate::error::RunError;
use crate::recorder::OutcomeRecorder;
use crate::scenario::Scenario;
use crate::transport::Transport;
use crate::user::{SimulatedUser, UserContext, UserId};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use throng_core::{ConfigError, RunConfig};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
#[allow(unused_imports)]
use tracing::{debug, error, info, info_span, instrument, trace, warn, Instrument};

/// Lifecycle of a [`UserPool`]. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolState {
    Idle,
    Ramping,
    Steady,
    Stopping,
    Stopped,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    running: AtomicUsize,
    peak: AtomicUsize,
    spawned: AtomicUsize,
    crashed: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Counts the caller as a Running user until the returned guard drops, unwinding included.
    pub(crate) fn enter_running(self: &Arc<Self>) -> RunningGuard {
        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(running, Ordering::AcqRel);
        RunningGuard {
            counters: Arc::clone(self),
        }
    }
}

pub(crate) struct RunningGuard {
    counters: Arc<PoolCounters>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Read-only view of a pool, usable from any task while the pool runs.
#[derive(Clone)]
pub struct PoolMonitor {
    state: watch::Receiver<PoolState>,
    counters: Arc<PoolCounters>,
}

impl PoolMonitor {
    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Users currently executing their scenario.
    pub fn running_users(&self) -> usize {
        self.counters.running()
    }

    /// Highest number of simultaneously running users seen so far.
    pub fn peak_users(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    pub fn spawned_users(&self) -> usize {
        self.counters.spawned.load(Ordering::Acquire)
    }

    pub fn crashed_users(&self) -> usize {
        self.counters.crashed.load(Ordering::Acquire)
    }

    /// Waits until the pool reaches `state` or a later one and returns the state observed.
    pub async fn wait_for(&self, state: PoolState) -> PoolState {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current >= state {
                return current;
            }
            if rx.changed().await.is_err() {
                let current = *rx.borrow();
                return current;
            }
        }
    }
}

/// Owner of every simulated user in a run.
///
/// Users are spawned as independent tokio tasks by a driver task, so [`UserPool::start`] must be
/// called from within a tokio runtime.
pub struct UserPool {
    recorder: OutcomeRecorder,
    state: Arc<watch::Sender<PoolState>>,
    stop: watch::Sender<bool>,
    counters: Arc<PoolCounters>,
    driver: Option<JoinHandle<()>>,
}

impl UserPool {
    pub fn new(recorder: OutcomeRecorder) -> Self {
        let (state, _) = watch::channel(PoolState::Idle);
        let (stop, _) = watch::channel(false);
        Self {
            recorder,
            state: Arc::new(state),
            stop,
            counters: Arc::new(PoolCounters::default()),
            driver: None,
        }
    }

    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            state: self.state.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Idle → Ramping. Validates `config` first; nothing is spawned if it is invalid.
    pub fn start<T>(
        &mut self,
        config: &RunConfig,
        scenario: Scenario,
        transport: Arc<T>,
    ) -> Result<(), RunError>
    where
        T: Transport + Sync + 'static,
    {
        if self.state() != PoolState::Idle {
            return Err(RunError::AlreadyStarted);
        }

        config.validate()?;
        let ramp = config
            .ramp_interval()
            .ok_or(ConfigError::InvalidRampRate(config.ramp_rate))?;

        let driver = PoolDriver {
            config: config.clone(),
            ramp,
            scenario,
            transport,
            recorder: self.recorder.clone(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
        };

        transition(&self.state, PoolState::Ramping);
        let stop = self.stop.subscribe();
        self.driver = Some(tokio::spawn(driver.run(stop).in_current_span()));
        Ok(())
    }

    /// Signals every user to stop and waits until all of them have finished their in-flight
    /// step. Safe to call any number of times; only the first call does any work.
    pub async fn stop(&mut self) -> Result<(), RunError> {
        self.stop.send_replace(true);

        let Some(driver) = self.driver.take() else {
            self.state.send_if_modified(|state| {
                if *state == PoolState::Idle {
                    info!("Pool stopped before it was started");
                    *state = PoolState::Stopped;
                    true
                } else {
                    false
                }
            });
            return Ok(());
        };

        if let Err(err) = driver.await {
            error!("User pool driver failed: {err}");
            transition(&self.state, PoolState::Stopped);
            return Err(err.into());
        }

        Ok(())
    }
}

fn transition(state: &watch::Sender<PoolState>, next: PoolState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        info!("Pool {current:?} -> {next:?}");
        *current = next;
        true
    });
}

/// Resolves once `stop` carries `true`, or once its sender is gone.
pub(crate) async fn stop_signal(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *stop.borrow_and_update();
        if stopped || stop.changed().await.is_err() {
            return;
        }
    }
}

fn ramp_limiter(interval: Duration) -> DefaultDirectRateLimiter {
    // Intervals too short for governor mean "spawn everyone at once".
    let quota = Quota::with_period(interval).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
    RateLimiter::direct(quota)
}

enum PoolEvent {
    Stop,
    Spawn,
    Exited(Result<UserId, JoinError>),
}

struct PoolDriver<T> {
    config: RunConfig,
    ramp: Duration,
    scenario: Scenario,
    transport: Arc<T>,
    recorder: OutcomeRecorder,
    state: Arc<watch::Sender<PoolState>>,
    counters: Arc<PoolCounters>,
}

impl<T> PoolDriver<T>
where
    T: Transport + Sync + 'static,
{
    #[instrument(name = "pool", skip_all, fields(users = self.config.users))]
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let target = self.config.users;
        let limiter = ramp_limiter(self.ramp);
        let mut users = JoinSet::new();
        let mut spawned = 0;

        info!(
            "Ramping up to {target} users, one every {}",
            humantime::format_duration(self.ramp)
        );

        // NOTE: Users that exit here have crashed; they are not replaced.
        loop {
            let event = tokio::select! {
                biased;
                _ = stop_signal(&mut stop) => PoolEvent::Stop,
                Some(exit) = users.join_next(), if !users.is_empty() => PoolEvent::Exited(exit),
                _ = limiter.until_ready(), if spawned < target => PoolEvent::Spawn,
            };

            match event {
                PoolEvent::Stop => break,
                PoolEvent::Exited(exit) => self.reap(exit),
                PoolEvent::Spawn => {
                    let id = spawned as UserId;
                    let user = self.user(id, stop.clone());
                    users.spawn(user.run().instrument(info_span!("user", id)));

                    spawned += 1;
                    self.counters.spawned.store(spawned, Ordering::Release);
                    trace!("Spawned user {id} ({spawned}/{target})");

                    if spawned == target {
                        transition(&self.state, PoolState::Steady);
                    }
                }
            }
        }

        transition(&self.state, PoolState::Stopping);
        debug!("Waiting on {} users to finish their current step", users.len());
        while let Some(exit) = users.join_next().await {
            self.reap(exit);
        }
        transition(&self.state, PoolState::Stopped);
    }

    fn user(&self, id: UserId, stop: watch::Receiver<bool>) -> SimulatedUser<T> {
        let seed = self
            .config
            .seed
            .map_or_else(rand::random, |seed| seed.wrapping_add(id));

        let ctx = UserContext {
            steps: self.scenario.shared_steps(),
            think_time: self.config.think_time,
            log_requests: self.config.logging.enabled,
            transport: Arc::clone(&self.transport),
            recorder: self.recorder.clone(),
            counters: Arc::clone(&self.counters),
        };

        SimulatedUser::new(id, seed, ctx, stop)
    }

    fn reap(&self, exit: Result<UserId, JoinError>) {
        match exit {
            Ok(id) => debug!("User {id} stopped"),
            Err(err) if err.is_panic() => {
                let crashed = self.counters.crashed.fetch_add(1, Ordering::AcqRel) + 1;
                error!("Simulated user crashed and was removed from the pool ({crashed} total): {err}");
            }
            Err(err) => warn!("Simulated user was cancelled: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::time::Instant;
    use throng_core::ThinkTime;

    fn config(users: usize, ramp_rate: f64) -> RunConfig {
        RunConfig::new("http://localhost:3002")
            .users(users)
            .ramp_rate(ramp_rate)
            .think_time(ThinkTime::between(
                Duration::from_millis(1),
                Duration::from_millis(5),
            ))
            .seed(42)
    }

    async fn wait_until_running(monitor: &PoolMonitor, users: usize) {
        while monitor.running_users() < users {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(5000)]
    async fn ramps_to_target_and_stops() {
        let recorder = OutcomeRecorder::new();
        let transport = Arc::new(MockTransport::new(Duration::from_millis(1)));
        let mut pool = UserPool::new(recorder.clone());
        let monitor = pool.monitor();
        assert_eq!(monitor.state(), PoolState::Idle);

        pool.start(&config(5, 1_000.), Scenario::timestamp_api(), transport.clone())
            .unwrap();
        assert_eq!(monitor.wait_for(PoolState::Steady).await, PoolState::Steady);
        wait_until_running(&monitor, 5).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.running_users(), 5);
        assert_eq!(monitor.spawned_users(), 5);
        assert_eq!(monitor.peak_users(), 5);

        pool.stop().await.unwrap();
        assert_eq!(monitor.state(), PoolState::Stopped);
        assert_eq!(monitor.running_users(), 0);
        assert_eq!(monitor.peak_users(), 5);

        let stats = recorder.snapshot();
        assert!(stats.total() > 0);
        assert_eq!(stats.total(), transport.calls() as u64);
    }

    #[tokio::test]
    #[ntest::timeout(5000)]
    async fn ramp_rate_paces_spawns() {
        let transport = Arc::new(MockTransport::new(Duration::from_millis(1)));
        let mut pool = UserPool::new(OutcomeRecorder::new());
        let monitor = pool.monitor();

        let start = Instant::now();
        pool.start(&config(3, 10.), Scenario::timestamp_api(), transport)
            .unwrap();
        monitor.wait_for(PoolState::Steady).await;

        // First user immediately, then one every 100ms.
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(monitor.spawned_users(), 3);
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    #[ntest::timeout(5000)]
    async fn stop_is_idempotent() {
        let transport = Arc::new(MockTransport::new(Duration::from_millis(1)));
        let mut pool = UserPool::new(OutcomeRecorder::new());
        let monitor = pool.monitor();

        let mut transitions = pool.monitor().state;
        pool.start(&config(2, 1_000.), Scenario::timestamp_api(), transport)
            .unwrap();
        monitor.wait_for(PoolState::Steady).await;

        pool.stop().await.unwrap();
        pool.stop().await.unwrap();
        pool.stop().await.unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);

        let mut seen = vec![];
        loop {
            seen.push(*transitions.borrow_and_update());
            if seen.last() == Some(&PoolState::Stopped) {
                break;
            }
            transitions.changed().await.unwrap();
        }
        assert_eq!(
            seen.iter().filter(|s| **s == PoolState::Stopped).count(),
            1
        );
        assert!(!transitions.has_changed().unwrap());
    }

    #[tokio::test]
    async fn stop_before_start() {
        let mut pool = UserPool::new(OutcomeRecorder::new());
        pool.stop().await.unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);

        let transport = Arc::new(MockTransport::new(Duration::ZERO));
        let err = pool
            .start(&config(1, 1.), Scenario::timestamp_api(), transport)
            .unwrap_err();
        assert!(matches!(err, RunError::AlreadyStarted));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let transport = Arc::new(MockTransport::new(Duration::from_millis(1)));
        let mut pool = UserPool::new(OutcomeRecorder::new());
        pool.start(&config(1, 1.), Scenario::timestamp_api(), transport.clone())
            .unwrap();

        let err = pool
            .start(&config(1, 1.), Scenario::timestamp_api(), transport)
            .unwrap_err();
        assert!(matches!(err, RunError::AlreadyStarted));
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_spawns_nothing() {
        let transport = Arc::new(MockTransport::new(Duration::ZERO));
        let mut pool = UserPool::new(OutcomeRecorder::new());
        let monitor = pool.monitor();

        let err = pool
            .start(&config(0, 1.), Scenario::timestamp_api(), transport.clone())
            .unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::NoUsers)));
        assert_eq!(monitor.state(), PoolState::Idle);
        assert_eq!(monitor.spawned_users(), 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(5000)]
    async fn crashed_user_is_not_replaced() {
        let transport = Arc::new(MockTransport::new(Duration::from_millis(1)).panic_on_call(0));
        let mut pool = UserPool::new(OutcomeRecorder::new());
        let monitor = pool.monitor();

        pool.start(&config(3, 1_000.), Scenario::timestamp_api(), transport)
            .unwrap();
        monitor.wait_for(PoolState::Steady).await;

        while monitor.crashed_users() < 1 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        wait_until_running(&monitor, 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(monitor.crashed_users(), 1);
        assert_eq!(monitor.running_users(), 2);
        assert_eq!(monitor.spawned_users(), 3);
        assert_eq!(monitor.state(), PoolState::Steady);

        pool.stop().await.unwrap();
        assert_eq!(monitor.state(), PoolState::Stopped);
        assert_eq!(monitor.running_users(), 0);
    }
}
