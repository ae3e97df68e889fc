use mock_service::MockConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDR: &str = "0.0.0.0:3002";

/// `MOCK_ADDR` picks the listen address, `MOCK_FAIL` a comma-separated list of paths that answer
/// 500 and `MOCK_DELAY_MS` a fixed delay for every response.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=debug,tower_http=debug")
        .init();

    let addr: SocketAddr = std::env::var("MOCK_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let mut config = MockConfig::default();
    if let Ok(failing) = std::env::var("MOCK_FAIL") {
        for path in failing.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            config = config.failing(path);
        }
    }
    if let Ok(delay) = std::env::var("MOCK_DELAY_MS") {
        config = config.delay(Duration::from_millis(delay.parse()?));
    }

    mock_service::run(addr, config).await
}
