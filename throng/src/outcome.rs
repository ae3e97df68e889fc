//! Classified result of a single request.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// Why a request counted as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// A response arrived but its status was not the one the step expects.
    UnexpectedStatus { code: u16, body: String },
    /// No complete response within the per-request timeout.
    Timeout,
    /// The connection could not be established (refused, DNS, TLS).
    Connect(String),
    /// Any other transport-level problem, e.g. a body that failed to decode.
    Transport(String),
}

impl FailureCause {
    /// Short grouping key used in the failure breakdown of the statistics.
    pub fn key(&self) -> String {
        match self {
            FailureCause::UnexpectedStatus { code, .. } => format!("status {code}"),
            FailureCause::Timeout => "timeout".to_string(),
            FailureCause::Connect(_) => "connection error".to_string(),
            FailureCause::Transport(_) => "transport error".to_string(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::UnexpectedStatus { code, body } => {
                write!(f, "failed with status {code}, response: {body}")
            }
            FailureCause::Timeout => write!(f, "timed out"),
            FailureCause::Connect(detail) => write!(f, "could not connect: {detail}"),
            FailureCause::Transport(detail) => write!(f, "transport error: {detail}"),
        }
    }
}

/// Outcome of one executed request step. Consumed by the
/// [`OutcomeRecorder`](crate::recorder::OutcomeRecorder) right after it is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub name: Arc<str>,
    pub status: Status,
    pub status_code: Option<u16>,
    pub elapsed: Duration,
    pub error: Option<FailureCause>,
}

impl RequestOutcome {
    pub fn success(name: Arc<str>, status_code: u16, elapsed: Duration) -> Self {
        Self {
            name,
            status: Status::Success,
            status_code: Some(status_code),
            elapsed,
            error: None,
        }
    }

    pub fn failure(
        name: Arc<str>,
        status_code: Option<u16>,
        elapsed: Duration,
        cause: FailureCause,
    ) -> Self {
        Self {
            name,
            status: Status::Failure,
            status_code,
            elapsed,
            error: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
