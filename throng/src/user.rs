use crate::pool::{stop_signal, PoolCounters};
use crate::recorder::OutcomeRecorder;
use crate::scenario::RequestStep;
use crate::transport::Transport;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use throng_core::ThinkTime;
use tokio::sync::watch;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Everything a user shares with the rest of its pool.
pub(crate) struct UserContext<T> {
    pub steps: Arc<[RequestStep]>,
    pub think_time: ThinkTime,
    pub log_requests: bool,
    pub transport: Arc<T>,
    pub recorder: OutcomeRecorder,
    pub counters: Arc<PoolCounters>,
}

/// One simulated client. Repeats the scenario's steps in order, pausing for a random think time
/// before each one, until the pool asks it to stop.
pub(crate) struct SimulatedUser<T> {
    id: UserId,
    /// Only surfaces in trace logs. Pools observe their users through `PoolCounters`.
    state: UserState,
    rng: SmallRng,
    ctx: UserContext<T>,
    stop: watch::Receiver<bool>,
}

impl<T> SimulatedUser<T>
where
    T: Transport + Sync,
{
    pub fn new(id: UserId, seed: u64, ctx: UserContext<T>, stop: watch::Receiver<bool>) -> Self {
        Self {
            id,
            state: UserState::Starting,
            rng: SmallRng::seed_from_u64(seed),
            ctx,
            stop,
        }
    }

    pub async fn run(mut self) -> UserId {
        let running = self.ctx.counters.enter_running();
        self.transition(UserState::Running);

        let steps = Arc::clone(&self.ctx.steps);
        if steps.is_empty() {
            warn!("Scenario has no steps; user {} idles until stopped", self.id);
            stop_signal(&mut self.stop).await;
        } else {
            'scenario: loop {
                for step in steps.iter() {
                    if !self.think().await {
                        break 'scenario;
                    }
                    self.execute(step).await;
                }
            }
        }

        self.transition(UserState::Stopping);
        drop(running);
        self.transition(UserState::Stopped);
        self.id
    }

    /// Pauses before the next step. Returns `false` if the user should stop instead.
    async fn think(&mut self) -> bool {
        if self.stop_requested() {
            return false;
        }

        let pause = self.pause();
        if pause.is_zero() {
            tokio::task::yield_now().await;
            return !self.stop_requested();
        }

        let stopped = tokio::select! {
            _ = tokio::time::sleep(pause) => false,
            _ = stop_signal(&mut self.stop) => true,
        };
        !stopped && !self.stop_requested()
    }

    fn pause(&mut self) -> Duration {
        if self.ctx.think_time.is_none() {
            return Duration::ZERO;
        }
        let ThinkTime { min, max } = self.ctx.think_time;
        if min >= max {
            min
        } else {
            self.rng.gen_range(min..=max)
        }
    }

    async fn execute(&mut self, step: &RequestStep) {
        let request = step.prepare(&mut self.rng);
        if self.ctx.log_requests {
            debug!(
                "Sending {step} request with body: {}",
                request.body().unwrap_or("")
            );
        }

        let outcome = self.ctx.transport.send(&request).await;

        if self.ctx.log_requests {
            match &outcome.error {
                None => debug!("{step} succeeded"),
                Some(cause) => error!("{step} {cause}"),
            }
        }

        self.ctx.recorder.record(outcome);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    fn transition(&mut self, next: UserState) {
        trace!("User {} {:?} -> {next:?}", self.id, self.state);
        self.state = next;
    }
}
