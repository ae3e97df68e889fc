//! Shared setup for the end-to-end tests.
use mock_service::{MockConfig, MockHandle};
use std::sync::OnceLock;
use std::time::Duration;
use throng::core::{RunConfig, ThinkTime};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

/// Installs a global subscriber once per test binary.
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("throng=debug,mock_service=debug")
            .try_init();
    });
}

pub async fn mock(config: MockConfig) -> MockHandle {
    init();
    match mock_service::spawn(config).await {
        Ok(mock) => mock,
        Err(err) => panic!("Unable to start the mock service: {err}"),
    }
}

/// A short run with sub-second think times against `host`.
pub fn quick_config(host: &str) -> RunConfig {
    RunConfig::new(host)
        .users(3)
        .ramp_rate(50.)
        .duration(Duration::from_secs(1))
        .timeout(Duration::from_secs(5))
        .think_time(ThinkTime::between(
            Duration::from_millis(10),
            Duration::from_millis(30),
        ))
        .report_interval(Duration::from_millis(250))
        .seed(7)
}
