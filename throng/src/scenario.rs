//! Request steps and the scenario a simulated user loops over.
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;

/// Request name of `GET /lasttimestamp`.
pub const LAST_TIMESTAMP: &str = "last-timestamp";
/// Request name of `POST /add`.
pub const ADD: &str = "add";
/// Request name of `GET /get`.
pub const GET: &str = "get";

const MIN_ENTRIES: u32 = 1;
const MAX_ENTRIES: u32 = 5;

/// How a step produces its request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyRule {
    Empty,
    /// A decimal entry count drawn uniformly from `min..=max`, fresh for every request.
    EntryCount { min: u32, max: u32 },
}

impl BodyRule {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        match *self {
            BodyRule::Empty => None,
            BodyRule::EntryCount { min, max } => {
                let count = rng.gen_range(min.min(max)..=max.max(min));
                Some(count.to_string())
            }
        }
    }
}

/// A named HTTP operation. Built once and shared read-only by every user.
#[derive(Debug, Clone)]
pub struct RequestStep {
    name: Arc<str>,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: BodyRule,
    expected_status: StatusCode,
}

impl RequestStep {
    pub fn new(name: &str, method: Method, path: &str) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: BodyRule::Empty,
            expected_status: StatusCode::OK,
        }
    }

    pub fn header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn body(mut self, body: BodyRule) -> Self {
        self.body = body;
        self
    }

    pub fn expect(mut self, status: StatusCode) -> Self {
        self.expected_status = status;
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_rule(&self) -> &BodyRule {
        &self.body
    }

    pub fn expected_status(&self) -> StatusCode {
        self.expected_status
    }

    /// Binds freshly generated values to this step.
    pub fn prepare<R: Rng + ?Sized>(&self, rng: &mut R) -> PreparedRequest<'_> {
        PreparedRequest {
            step: self,
            body: self.body.generate(rng),
        }
    }
}

impl fmt::Display for RequestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A step with its body generated, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest<'a> {
    step: &'a RequestStep,
    body: Option<String>,
}

impl<'a> PreparedRequest<'a> {
    pub fn step(&self) -> &'a RequestStep {
        self.step
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Ordered list of steps a simulated user repeats until told to stop.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    steps: Arc<[RequestStep]>,
}

impl Scenario {
    pub fn new(name: &str, steps: Vec<RequestStep>) -> Self {
        Self {
            name: name.to_string(),
            steps: steps.into(),
        }
    }

    /// The timestamp API scenario: read the last timestamp, add a handful of entries, read the
    /// current state.
    pub fn timestamp_api() -> Self {
        Self::new(
            "timestamp-api",
            vec![
                RequestStep::new(LAST_TIMESTAMP, Method::GET, "/lasttimestamp")
                    .header(ACCEPT, "application/json"),
                RequestStep::new(ADD, Method::POST, "/add")
                    .header(CONTENT_TYPE, "text/plain")
                    .header(ACCEPT, "application/json")
                    .body(BodyRule::EntryCount {
                        min: MIN_ENTRIES,
                        max: MAX_ENTRIES,
                    }),
                RequestStep::new(GET, Method::GET, "/get").header(ACCEPT, "application/json"),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[RequestStep] {
        &self.steps
    }

    pub(crate) fn shared_steps(&self) -> Arc<[RequestStep]> {
        Arc::clone(&self.steps)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::timestamp_api()
    }
}
