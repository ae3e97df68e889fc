//! HTTP transport seam. Every request a simulated user makes goes through a [`Transport`].
use crate::error::RunError;
use crate::outcome::{FailureCause, RequestOutcome};
use crate::scenario::PreparedRequest;
use reqwest::Client;
use std::time::{Duration, Instant};
use throng_core::RunConfig;
use url::Url;

/// Issues one prepared request and classifies what came back.
///
/// Implementations never fail: every problem, from a refused connection to an unexpected status,
/// is folded into the returned [`RequestOutcome`].
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn send(&self, request: &PreparedRequest<'_>) -> RequestOutcome;
}

/// `reqwest`-backed transport bound to one target host and one per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, RunError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    /// Validates `config` and binds a transport to its host and timeout.
    pub fn from_config(config: &RunConfig) -> Result<Self, RunError> {
        let base = config.validate()?;
        Self::new(base, config.timeout)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest<'_>) -> RequestOutcome {
        let step = request.step();
        let name = step.name().clone();
        let start = Instant::now();

        let url = match self.url(step.path()) {
            Ok(url) => url,
            Err(err) => {
                return RequestOutcome::failure(
                    name,
                    None,
                    start.elapsed(),
                    FailureCause::Transport(format!("invalid path {}: {err}", step.path())),
                )
            }
        };

        let mut builder = self
            .client
            .request(step.method().clone(), url)
            .headers(step.headers().clone())
            .timeout(self.timeout);
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return RequestOutcome::failure(name, None, start.elapsed(), classify(&err)),
        };

        let status = response.status();
        let body = response.text().await;
        let elapsed = start.elapsed();

        match body {
            Ok(_) if status == step.expected_status() => {
                RequestOutcome::success(name, status.as_u16(), elapsed)
            }
            Ok(body) => RequestOutcome::failure(
                name,
                Some(status.as_u16()),
                elapsed,
                FailureCause::UnexpectedStatus {
                    code: status.as_u16(),
                    body,
                },
            ),
            Err(err) => RequestOutcome::failure(name, Some(status.as_u16()), elapsed, classify(&err)),
        }
    }
}

fn classify(err: &reqwest::Error) -> FailureCause {
    if err.is_timeout() {
        FailureCause::Timeout
    } else if err.is_connect() {
        FailureCause::Connect(err.to_string())
    } else {
        FailureCause::Transport(err.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::net::TcpListener;

    #[test]
    fn resolves_paths_below_base() {
        let transport = HttpTransport::new(
            Url::parse("http://localhost:3002/api/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            transport.url("/lasttimestamp").unwrap().as_str(),
            "http://localhost:3002/api/lasttimestamp"
        );
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let err = HttpTransport::from_config(&RunConfig::new("nope")).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_failure_outcome() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let transport = HttpTransport::from_config(
            &RunConfig::new(&format!("http://{addr}")).timeout(Duration::from_secs(5)),
        )
        .unwrap();

        let scenario = Scenario::timestamp_api();
        let mut rng = SmallRng::seed_from_u64(0);
        let request = scenario.steps()[0].prepare(&mut rng);
        let outcome = Transport::send(&transport, &request).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.status_code, None);
        assert_eq!(&*outcome.name, "last-timestamp");
        assert!(matches!(outcome.error, Some(FailureCause::Connect(_))));
    }
}
