//! Plain data shared by the throng engine and its front-ends: run configuration, the errors
//! raised while validating it, and the statistics a run produces.
mod config;
mod constants;
mod error;
mod latency;
mod stats;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use latency::*;
pub use stats::*;
