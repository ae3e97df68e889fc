#![doc = include_str!("../../README.md")]

pub mod outcome;
pub mod pool;
pub mod recorder;
pub mod run;
pub mod scenario;
pub mod transport;

mod error;
pub(crate) mod timer;
pub(crate) mod user;

pub use error::RunError;
pub use outcome::{FailureCause, RequestOutcome, Status};
pub use pool::{PoolMonitor, PoolState, UserPool};
pub use recorder::OutcomeRecorder;
pub use run::{run, run_with, Run};
pub use scenario::{BodyRule, PreparedRequest, RequestStep, Scenario};
pub use transport::{HttpTransport, LocalTransport, Transport};
pub use reqwest::{Method, StatusCode};
pub use user::{UserId, UserState};

pub use throng_core as core;

pub mod prelude {
    pub use crate::{run, run_with, Run, RunError, Scenario, Transport};
    pub use throng_core::{AggregateStats, RequestStats, RunConfig, ThinkTime};
}
